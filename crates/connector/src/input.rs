use std::fmt;
use std::str::FromStr;

use renderer::{ChannelInput, InputSource, CHANNEL_COUNT};

use crate::error::{Error, Result};
use crate::image::Image;

/// Input slot of a buffer, possibly substituted by the caller.
///
/// The configured input is kept inside an override so that resetting the
/// channel brings it back untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Channel {
    Original(Option<ChannelInput>),
    Overridden {
        original: Option<ChannelInput>,
        current: ChannelInput,
    },
}

impl Default for Channel {
    fn default() -> Self {
        Self::Original(None)
    }
}

impl Channel {
    pub fn new(input: Option<ChannelInput>) -> Self {
        Self::Original(input)
    }

    /// Input currently bound to the channel.
    pub fn current(&self) -> Option<&ChannelInput> {
        match self {
            Self::Original(input) => input.as_ref(),
            Self::Overridden { current, .. } => Some(current),
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut ChannelInput> {
        match self {
            Self::Original(input) => input.as_mut(),
            Self::Overridden { current, .. } => Some(current),
        }
    }

    pub fn original(&self) -> Option<&ChannelInput> {
        match self {
            Self::Original(input) | Self::Overridden { original: input, .. } => input.as_ref(),
        }
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Overridden { .. })
    }

    /// Substitutes the source of the channel.
    ///
    /// The first override starts from the default sampler; later ones only
    /// swap the source and keep any filter set in between.
    pub fn override_with(&mut self, source: InputSource) {
        match self {
            Self::Overridden { current, .. } => current.source = source,
            Self::Original(original) => {
                *self = Self::Overridden {
                    original: original.take(),
                    current: ChannelInput::new(source),
                };
            }
        }
    }

    /// Restores the configured input; a no-op when not overridden.
    pub fn reset(&mut self) {
        if let Self::Overridden { original, .. } = self {
            *self = Self::Original(original.take());
        }
    }
}

/// Value fed to a channel by [`set_input`](crate::RenderContext::set_input).
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// Output of another buffer of the same context.
    Buffer(String),
    /// Static caller-supplied picture.
    Image(Image),
}

/// `buffer.channel` address of an input, as typed on a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub buffer: String,
    pub channel: usize,
}

impl InputSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (buffer, channel) = spec
            .rsplit_once('.')
            .ok_or_else(|| Error::Config(format!("Invalid input specification {spec}")))?;
        let channel = channel
            .parse::<usize>()
            .ok()
            .filter(|channel| *channel < CHANNEL_COUNT)
            .ok_or_else(|| Error::Config(format!("Invalid channel number {channel}")))?;
        if buffer.is_empty() {
            return Err(Error::Config(format!("Invalid input specification {spec}")));
        }
        Ok(Self {
            buffer: buffer.to_lowercase(),
            channel,
        })
    }
}

impl FromStr for InputSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.buffer, self.channel)
    }
}
