use std::path::{Path, PathBuf};

use renderer::{BufferTemplate, PassPlan, CHANNEL_COUNT};

use crate::error::{Error, Result};
use crate::input::Channel;

/// Name of the buffer whose output is read back.
pub const IMAGE_BUFFER: &str = "image";

/// One named render pass and its four input channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ToyBuffer {
    name: String,
    source: PathBuf,
    channels: [Channel; CHANNEL_COUNT],
}

impl ToyBuffer {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// GLSL unit holding the buffer's code.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }
}

/// Ordered buffers of a shader plus the template they are compiled with.
#[derive(Debug, Clone, Default)]
pub struct BufferGraph {
    template: BufferTemplate,
    buffers: Vec<ToyBuffer>,
}

impl BufferGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(&self) -> &BufferTemplate {
        &self.template
    }

    pub fn template_mut(&mut self) -> &mut BufferTemplate {
        &mut self.template
    }

    /// Appends a buffer with four empty channels; names are stored lowercase.
    pub fn push(&mut self, name: &str, source: impl Into<PathBuf>) -> Result<&mut ToyBuffer> {
        let name = name.to_lowercase();
        if self.buffers.iter().any(|buffer| buffer.name == name) {
            return Err(Error::Config(format!("Duplicate buffer name {name}")));
        }
        self.buffers.push(ToyBuffer {
            name,
            source: source.into(),
            channels: Default::default(),
        });
        let last = self.buffers.len() - 1;
        Ok(&mut self.buffers[last])
    }

    pub fn buffers(&self) -> &[ToyBuffer] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.buffer(name).is_some()
    }

    pub fn buffer(&self, name: &str) -> Option<&ToyBuffer> {
        let name = name.to_lowercase();
        self.buffers.iter().find(|buffer| buffer.name == name)
    }

    pub fn buffer_mut(&mut self, name: &str) -> Option<&mut ToyBuffer> {
        let name = name.to_lowercase();
        self.buffers.iter_mut().find(|buffer| buffer.name == name)
    }

    /// Checks that the graph ends with the image buffer.
    pub fn validate(&self) -> Result<()> {
        match self.buffers.last() {
            None => Err(Error::Config("The buffer graph is empty".to_string())),
            Some(last) if last.name != IMAGE_BUFFER => {
                if self.contains(IMAGE_BUFFER) {
                    Err(Error::Config(format!(
                        "The {IMAGE_BUFFER} buffer must be the last buffer, found {} last",
                        last.name
                    )))
                } else {
                    Err(Error::Config(format!(
                        "No {IMAGE_BUFFER} buffer was defined"
                    )))
                }
            }
            Some(_) => Ok(()),
        }
    }

    /// Current inputs of every buffer, in render order.
    pub fn plan(&self) -> Vec<PassPlan> {
        self.buffers
            .iter()
            .map(|buffer| {
                let mut plan = PassPlan::new(buffer.name.clone(), buffer.source.clone());
                for (slot, channel) in plan.inputs.iter_mut().zip(&buffer.channels) {
                    *slot = channel.current().cloned();
                }
                plan
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use renderer::{ChannelInput, InputSource};

    use super::*;

    #[test]
    fn names_are_case_insensitive_unique() {
        let mut graph = BufferGraph::new();
        graph.push("Buffer A", "a.glsl").unwrap();
        let err = graph.push("buffer a", "b.glsl").unwrap_err();
        assert_eq!(err.to_string(), "Duplicate buffer name buffer a");
        assert!(graph.contains("BUFFER A"));
        assert_eq!(graph.buffers()[0].name(), "buffer a");
    }

    #[test]
    fn image_buffer_must_come_last() {
        let mut graph = BufferGraph::new();
        assert!(matches!(graph.validate(), Err(Error::Config(_))));

        graph.push("image", "image.glsl").unwrap();
        assert!(graph.validate().is_ok());

        graph.push("buffer a", "a.glsl").unwrap();
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("must be the last buffer"));

        let mut no_image = BufferGraph::new();
        no_image.push("buffer a", "a.glsl").unwrap();
        assert_eq!(
            no_image.validate().unwrap_err().to_string(),
            "No image buffer was defined"
        );
    }

    #[test]
    fn plan_reflects_current_channels() {
        let mut graph = BufferGraph::new();
        graph.push("buffer a", "a.glsl").unwrap();
        let image = graph.push("image", "image.glsl").unwrap();
        *image.channel_mut(1).unwrap() = Channel::new(Some(ChannelInput::new(
            InputSource::Buffer("buffer a".into()),
        )));

        let plan = graph.plan();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].name, "image");
        assert_eq!(plan[1].source, PathBuf::from("image.glsl"));
        assert!(plan[1].inputs[0].is_none());
        assert_eq!(
            plan[1].inputs[1].as_ref().map(|input| &input.source),
            Some(&InputSource::Buffer("buffer a".into()))
        );
    }
}
