//! Offsite bulk storage
//!
//! The core abstraction is the [`OffsiteStorage`] trait. Two implementations
//! are provided:
//!
//! - [`MegaCliStorage`]: drives the `mega-cmd` command-line clients
//! - [`NoOpStorage`]: used when no account is configured
//!
//! ## Usage
//!
//! ```no_run
//! use anime_relay::config::OffsiteConfig;
//! use anime_relay::offsite::{MegaCliStorage, OffsiteStorage, title_folder};
//! use std::path::Path;
//!
//! # async fn example() -> anime_relay::Result<()> {
//! let storage = MegaCliStorage::from_config(&OffsiteConfig::default());
//! storage.ensure_session().await?;
//!
//! let folder = title_folder("/Root/AnimeDownloads", "One Piece");
//! storage.ensure_folder(&folder).await?;
//! storage.upload(Path::new("ep1.mp4"), &folder, "One_Piece_E01_1080p.mp4").await?;
//! # Ok(())
//! # }
//! ```

mod mega;
mod noop;
mod traits;

pub use mega::MegaCliStorage;
pub use noop::NoOpStorage;
pub use traits::OffsiteStorage;

/// Remote folder that receives a title's episodes: `root/<safe title>`
pub fn title_folder(root: &str, title: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        crate::utils::safe_name(title)
    )
}
