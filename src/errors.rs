//! Crate-wide error alias. Backend code reports failures through
//! `failure::Error`, built with `bail!` and `format_err!`.

pub use failure::Error;

pub type Result<T> = ::std::result::Result<T, Error>;
