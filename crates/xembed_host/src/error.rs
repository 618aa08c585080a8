use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("another system tray is already running on this screen")]
    SelectionAlreadyOwned,
    #[error("X11 connection error")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("X11 request failed")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("X11 resource id allocation failed")]
    Id(#[from] x11rb::errors::ReplyOrIdError),
}

pub type Result<T> = std::result::Result<T, Error>;
