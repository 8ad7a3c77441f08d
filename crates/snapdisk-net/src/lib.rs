//! snapdisk-net — endpoints, frame marshalling, the image server, the
//! remote image client, and the TLS trust store.

pub mod endpoint;
pub mod keystore;
pub mod marshal;
pub mod remote;
pub mod server;
pub mod tls;
pub mod uri;

pub use endpoint::{Endpoint, EndpointError};
pub use keystore::{KeyStore, KeyStoreError};
pub use marshal::{Frame, ProtoError};
pub use remote::RemoteImage;
pub use server::ImageServer;
pub use uri::{ConnectError, EndpointAddr, UriError};
