//! Conversational backend client

pub mod answer;
pub mod transport;

pub use answer::{base_url_of, AnswerRequest, AnswerRequestClient, AnswerResult};
pub use transport::{ByteStream, HttpTransport, StreamRequest, Transport};
