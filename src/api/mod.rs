//! External order API: token exchange, paced record fetches, and the HTTP seam.

mod client;
mod token;
mod transport;

pub use client::{ExternalRecordClient, FetchOutcome, RecordSource, Sleeper, ThreadSleeper};
pub use token::{AccessToken, TokenCache};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError};
