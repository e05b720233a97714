use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Frame is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Failed to decode frame image: {0}")]
    Decode(#[from] image::ImageError),
}
