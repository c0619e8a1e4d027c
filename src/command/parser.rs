//! `/dl` argument parsing

use crate::error::ParseError;
use crate::types::{AudioTrack, DestinationFlags, JobRequest, Resolution, ResolutionPreference};

use super::episodes::expand_episodes;

/// One whitespace-separated argument, remembering whether it was quoted
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub(crate) text: String,
    pub(crate) quoted: bool,
}

impl Token {
    fn is_flag(&self) -> bool {
        !self.quoted && self.text.starts_with('-') && self.text.len() > 1
    }
}

/// Split arguments on whitespace, grouping single- or double-quoted runs.
///
/// Smart quotes from mobile keyboards are treated like their ASCII forms.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut open: Option<char> = None;

    for c in input.chars() {
        let c = normalize_quote(c);
        match open {
            Some(q) if c == q => open = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                open = Some(c);
                quoted = true;
            }
            None if c.is_whitespace() => {
                if !current.is_empty() || quoted {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                }
                quoted = false;
            }
            None => current.push(c),
        }
    }

    if open.is_some() {
        return Err(ParseError::UnterminatedQuote);
    }
    if !current.is_empty() || quoted {
        tokens.push(Token {
            text: current,
            quoted,
        });
    }
    Ok(tokens)
}

fn normalize_quote(c: char) -> char {
    match c {
        '\u{201C}' | '\u{201D}' => '"',
        '\u{2018}' | '\u{2019}' => '\'',
        c => c,
    }
}

/// Parse a `-r` value
pub(crate) fn parse_resolution(value: &str) -> Result<ResolutionPreference, ParseError> {
    let lowered = value.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "all" => Ok(ResolutionPreference::Ladder),
        "best" => Ok(ResolutionPreference::Best),
        other => other
            .trim_end_matches('p')
            .parse::<u16>()
            .ok()
            .filter(|r| *r > 0)
            .map(|r| ResolutionPreference::Exact(Resolution(r)))
            .ok_or_else(|| ParseError::InvalidResolution(value.to_string())),
    }
}

/// Parse the arguments of a `/dl` command into a [`JobRequest`].
///
/// Errors are checked in the order users hit them: no arguments, missing `-e`,
/// missing title, then an episode specification that expands to nothing.
pub fn parse_download(args: &str) -> Result<JobRequest, ParseError> {
    if args.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens = tokenize(args)?;
    let mut title: Option<String> = None;
    let mut episode_spec: Option<String> = None;
    let mut resolution = ResolutionPreference::default();
    let mut audio = AudioTrack::default();
    let mut destinations = DestinationFlags::default();
    let mut saw_episode_flag = false;

    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        if !token.is_flag() {
            tracing::debug!(token = %token.text, "ignoring stray argument");
            continue;
        }

        // Value-taking flags consume the next token unless it is itself a flag.
        let mut take_value = || iter.next_if(|next| !next.is_flag()).map(|t| t.text.clone());

        match token.text.as_str() {
            "-a" | "--anime" => {
                title = take_value().map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
            }
            "-e" | "--episodes" => {
                saw_episode_flag = true;
                episode_spec = take_value();
            }
            "-r" | "--resolution" => {
                let value = take_value().ok_or_else(|| ParseError::InvalidResolution(String::new()))?;
                resolution = parse_resolution(&value)?;
            }
            "-o" | "--audio" => {
                let value = take_value().unwrap_or_default();
                audio = AudioTrack::from_code(&value).ok_or(ParseError::InvalidAudio(value))?;
            }
            "--video" => destinations.as_video = true,
            "--channel" => destinations.channels = Some(true),
            "--no-channel" => destinations.channels = Some(false),
            "--mega" => destinations.offsite = Some(true),
            "--no-mega" => destinations.offsite = Some(false),
            other => tracing::debug!(flag = other, "ignoring unknown flag"),
        }
    }

    if !saw_episode_flag {
        return Err(ParseError::MissingEpisodes);
    }
    let title = title.ok_or(ParseError::MissingTitle)?;
    let episode_spec = episode_spec.ok_or(ParseError::MissingEpisodes)?;
    let episodes = expand_episodes(&episode_spec)?;

    Ok(JobRequest {
        title,
        episodes,
        resolution,
        audio,
        destinations,
    })
}
