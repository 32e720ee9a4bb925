use crate::config::FILE_BUFFER_SIZE;
use futures::{future, stream, StreamExt, TryStreamExt};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Bytes, Frame};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

pub fn empty<E>() -> BoxBody<Bytes, E> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

pub fn full<E>(bytes: impl Into<Bytes>) -> BoxBody<Bytes, E> {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn from_reader(
    reader: impl AsyncRead + Send + Sync + 'static,
) -> impl Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static {
    let stream = ReaderStream::with_capacity(reader, FILE_BUFFER_SIZE);
    StreamBody::new(stream.map_ok(Frame::data))
}

/// Streams each reader preceded by its header, then the trailer.
pub fn from_parts<R>(
    parts: Vec<(Bytes, R)>,
    trailer: Bytes,
) -> impl Body<Data = Bytes, Error = io::Error> + Send + Sync + 'static
where
    R: AsyncRead + Send + Sync + 'static,
{
    let stream = stream::iter(parts)
        .flat_map(|(header, reader)| {
            stream::once(future::ready(Ok(header)))
                .chain(ReaderStream::with_capacity(reader, FILE_BUFFER_SIZE))
        })
        .chain(stream::once(future::ready(Ok(trailer))));
    StreamBody::new(stream.map_ok(Frame::data))
}
