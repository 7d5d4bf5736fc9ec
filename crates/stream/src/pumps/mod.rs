//! Background tasks owned by a [`StreamLink`](crate::ws_client::StreamLink).

pub(crate) mod heartbeat;
pub(crate) mod read;
pub(crate) mod write;
