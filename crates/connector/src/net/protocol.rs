use crate::error::{Error, Result};
use crate::host::RenderRequest;
use crate::image::Image;
use crate::input::InputValue;

use super::frame::{FrameReader, FrameWriter};

pub const OK: &str = "OK";
pub const ERROR: &str = "ERROR";

const RENDER: &str = "render";
const RESET: &str = "reset";
const CREATE_LOCAL: &str = "create_local";
const GET_CONTEXT: &str = "get_context";
const CONTEXT: &str = "context";

const SET_INPUT: &str = "set_input";
const SET_INPUT_FILTER: &str = "set_input_filter";
const RESET_INPUT: &str = "reset_input";

const INPUT_IMAGE: &str = "image";
const INPUT_BUFFER: &str = "buffer";

/// Frame value standing for "continue from the context's counter".
const NO_FRAME: i32 = i32::MIN;

/// One host operation as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Render(RenderRequest),
    Reset { id: String },
    CreateLocal { sources: Vec<(String, String)> },
    GetContext { id: String },
    Context { id: String, call: ContextCall },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextCall {
    SetInput {
        buffer: String,
        channel: u8,
        value: InputValue,
    },
    SetInputFilter {
        buffer: String,
        channel: u8,
        min_filter: i32,
    },
    ResetInput {
        buffer: String,
        channel: u8,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Render(_) => RENDER,
            Self::Reset { .. } => RESET,
            Self::CreateLocal { .. } => CREATE_LOCAL,
            Self::GetContext { .. } => GET_CONTEXT,
            Self::Context { .. } => CONTEXT,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = FrameWriter::new();
        frame.string(self.name());
        match self {
            Self::Render(request) => {
                frame
                    .string(&request.id)
                    .i32(request.frame.unwrap_or(NO_FRAME))
                    .u32(request.width)
                    .u32(request.height)
                    .f32x4(request.mouse)
                    .u32(request.format);
            }
            Self::Reset { id } | Self::GetContext { id } => {
                frame.string(id);
            }
            Self::CreateLocal { sources } => {
                frame.u32(sources.len() as u32);
                for (name, source) in sources {
                    frame.string(name).string(source);
                }
            }
            Self::Context { id, call } => {
                frame.string(id);
                match call {
                    ContextCall::SetInput {
                        buffer,
                        channel,
                        value,
                    } => {
                        frame.string(SET_INPUT).string(buffer).u8(*channel);
                        match value {
                            InputValue::Image(image) => {
                                frame
                                    .string(INPUT_IMAGE)
                                    .dims(image.dims())
                                    .floats(image.data());
                            }
                            InputValue::Buffer(name) => {
                                frame.string(INPUT_BUFFER).string(name);
                            }
                        }
                    }
                    ContextCall::SetInputFilter {
                        buffer,
                        channel,
                        min_filter,
                    } => {
                        frame
                            .string(SET_INPUT_FILTER)
                            .string(buffer)
                            .u8(*channel)
                            .i32(*min_filter);
                    }
                    ContextCall::ResetInput { buffer, channel } => {
                        frame.string(RESET_INPUT).string(buffer).u8(*channel);
                    }
                }
            }
        }
        frame.finish()
    }

    pub fn decode(reader: &mut FrameReader<'_>) -> Result<Self> {
        let name = reader.string()?;
        let request = match name.as_str() {
            RENDER => {
                let id = reader.string()?;
                let frame = Some(reader.i32()?).filter(|frame| *frame != NO_FRAME);
                Self::Render(RenderRequest {
                    id,
                    frame,
                    width: reader.u32()?,
                    height: reader.u32()?,
                    mouse: reader.f32x4()?,
                    format: reader.u32()?,
                })
            }
            RESET => Self::Reset {
                id: reader.string()?,
            },
            CREATE_LOCAL => {
                let count = reader.u32()?;
                let mut sources = Vec::new();
                for _ in 0..count {
                    sources.push((reader.string()?, reader.string()?));
                }
                Self::CreateLocal { sources }
            }
            GET_CONTEXT => Self::GetContext {
                id: reader.string()?,
            },
            CONTEXT => Self::Context {
                id: reader.string()?,
                call: ContextCall::decode(reader)?,
            },
            _ => {
                return Err(Error::InvalidOperation(
                    "Unknown request name".to_string(),
                ))
            }
        };
        Ok(request)
    }
}

impl ContextCall {
    fn decode(reader: &mut FrameReader<'_>) -> Result<Self> {
        let method = reader.string()?;
        let call = match method.as_str() {
            SET_INPUT => {
                let buffer = reader.string()?;
                let channel = reader.u8()?;
                let kind = reader.string()?;
                let value = match kind.as_str() {
                    INPUT_IMAGE => InputValue::Image(read_image(reader)?),
                    INPUT_BUFFER => InputValue::Buffer(reader.string()?),
                    _ => {
                        return Err(Error::InvalidOperation(format!(
                            "Unknown input type: {kind}"
                        )))
                    }
                };
                Self::SetInput {
                    buffer,
                    channel,
                    value,
                }
            }
            SET_INPUT_FILTER => Self::SetInputFilter {
                buffer: reader.string()?,
                channel: reader.u8()?,
                min_filter: reader.i32()?,
            },
            RESET_INPUT => Self::ResetInput {
                buffer: reader.string()?,
                channel: reader.u8()?,
            },
            _ => {
                return Err(Error::InvalidOperation(format!(
                    "Unknown context method {method}"
                )))
            }
        };
        Ok(call)
    }
}

fn read_image(reader: &mut FrameReader<'_>) -> Result<Image> {
    let dims = reader.dims()?;
    Image::from_data(dims, reader.floats()?)
}

pub fn ok_response() -> Vec<u8> {
    FrameWriter::new().string(OK).finish()
}

pub fn id_response(id: &str) -> Vec<u8> {
    FrameWriter::new().string(OK).string(id).finish()
}

pub fn image_response(image: &Image) -> Vec<u8> {
    FrameWriter::new()
        .string(OK)
        .u64(image.frame_timing())
        .dims(image.dims())
        .floats(image.data())
        .finish()
}

pub fn error_response(message: &str) -> Vec<u8> {
    FrameWriter::new().string(ERROR).string(message).finish()
}

/// Consumes the status segment; `ERROR` becomes [`Error::Remote`].
pub fn read_status(reader: &mut FrameReader<'_>) -> Result<()> {
    let status = reader.string()?;
    match status.as_str() {
        OK => Ok(()),
        ERROR => Err(Error::Remote(reader.string()?)),
        other => Err(Error::Protocol(format!("unexpected response status {other}"))),
    }
}

/// Reads the body of [`image_response`] after its status.
pub fn read_rendered_image(reader: &mut FrameReader<'_>) -> Result<Image> {
    let frame_timing = reader.u64()?;
    let mut image = read_image(reader)?;
    image.set_frame_timing(frame_timing);
    image.set_changed(true);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use renderer::gl;

    use super::*;

    fn decode(bytes: &[u8]) -> Result<Request> {
        Request::decode(&mut FrameReader::new(bytes))
    }

    #[test]
    fn render_without_frame_uses_sentinel() {
        let request = Request::Render(RenderRequest::new("abc", 4, 2).with_mouse([1.0, 2.0, 3.0, 4.0]));
        let bytes = request.encode();

        let mut reader = FrameReader::new(&bytes);
        assert_eq!(reader.string().unwrap(), "render");
        assert_eq!(reader.string().unwrap(), "abc");
        assert_eq!(reader.i32().unwrap(), i32::MIN);

        assert_eq!(decode(&bytes).unwrap(), request);
    }

    #[test]
    fn create_local_carries_a_count() {
        let request = Request::CreateLocal {
            sources: vec![
                ("buffer a".into(), "// a".into()),
                ("image".into(), "// image".into()),
            ],
        };
        let bytes = request.encode();
        let mut reader = FrameReader::new(&bytes);
        reader.string().unwrap();
        assert_eq!(reader.u32().unwrap(), 2);
        assert_eq!(decode(&bytes).unwrap(), request);
    }

    #[test]
    fn context_calls_decode() {
        let image = Image::from_data([1, 2, 1], vec![0.5, 0.75]).unwrap();
        let calls = [
            ContextCall::SetInput {
                buffer: "image".into(),
                channel: 1,
                value: InputValue::Image(image),
            },
            ContextCall::SetInput {
                buffer: "image".into(),
                channel: 0,
                value: InputValue::Buffer("buffer a".into()),
            },
            ContextCall::SetInputFilter {
                buffer: "buffer a".into(),
                channel: 3,
                min_filter: gl::NEAREST,
            },
            ContextCall::ResetInput {
                buffer: "image".into(),
                channel: 2,
            },
        ];
        for call in calls {
            let request = Request::Context {
                id: "ctx".into(),
                call,
            };
            assert_eq!(decode(&request.encode()).unwrap(), request);
        }
    }

    #[test]
    fn unknown_names_are_reported() {
        let bytes = FrameWriter::new().string("explode").finish();
        assert_eq!(decode(&bytes).unwrap_err().to_string(), "Unknown request name");

        let bytes = FrameWriter::new()
            .string("context")
            .string("ctx")
            .string("explode")
            .finish();
        assert_eq!(
            decode(&bytes).unwrap_err().to_string(),
            "Unknown context method explode"
        );

        let bytes = FrameWriter::new()
            .string("context")
            .string("ctx")
            .string("set_input")
            .string("image")
            .u8(0)
            .string("webcam")
            .finish();
        assert_eq!(
            decode(&bytes).unwrap_err().to_string(),
            "Unknown input type: webcam"
        );
    }

    #[test]
    fn responses_carry_status() {
        let mut image = Image::from_data([1, 1, 3], vec![0.1, 0.2, 0.3]).unwrap();
        image.set_frame_timing(99);
        let bytes = image_response(&image);
        let mut reader = FrameReader::new(&bytes);
        read_status(&mut reader).unwrap();
        let decoded = read_rendered_image(&mut reader).unwrap();
        assert_eq!(decoded.dims(), [1, 1, 3]);
        assert_eq!(decoded.data(), image.data());
        assert_eq!(decoded.frame_timing(), 99);

        let bytes = error_response("Cannot reset a local context.");
        let err = read_status(&mut FrameReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, Error::Remote(ref message) if message == "Cannot reset a local context."));
    }
}
