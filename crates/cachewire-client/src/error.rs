use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("invalid relay URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("relay URL scheme `{0}` is not http(s) or ws(s)")]
    UnsupportedScheme(String),
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
}
