use super::backends::BackendKind;

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "Backend: {}", _0)]
    Backend(String),
    #[fail(display = "Operation requires a {:?} display, but the display is {:?}.", _0, _1)]
    BackendMismatch(BackendKind, BackendKind),
    #[fail(display = "The device doesn\'t support {}.", _0)]
    Unsupported(String),
    #[fail(display = "Invalid vertex declaration: {}.", _0)]
    InvalidDeclaration(String),
    #[fail(display = "Bitmap is locked.")]
    BitmapLocked,
    #[fail(display = "Out of bounds.")]
    OutOfBounds,
    #[fail(display = "Failed to allocate {}.", _0)]
    ResourceExhausted(String),
    #[fail(display = "The device is lost.")]
    DeviceLost,
    #[fail(display = "Failed to parse settings: {}", _0)]
    Settings(String),
    #[fail(display = "Video system has been shut down.")]
    Shutdown,
}

pub type Result<T> = ::std::result::Result<T, Error>;

impl From<failure::Error> for Error {
    fn from(err: failure::Error) -> Error {
        Error::Backend(format!("{}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Settings(format!("{}", err))
    }
}
