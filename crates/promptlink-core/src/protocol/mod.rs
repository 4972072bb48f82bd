//! Protocol module containing the JSON envelope types, their codec, and the
//! join-URL helper.

pub mod codec;
pub mod connect_url;
pub mod messages;

pub use codec::{
    decode_client_message, decode_server_message, encode_client_message,
    encode_server_envelope, ProtocolError,
};
pub use connect_url::{is_valid_pairing_code, ConnectUrl, JoinCredential, UrlError};
pub use messages::*;
