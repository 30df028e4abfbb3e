use std::{
    io::{self, Write},
    mem,
};

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{
        header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH},
        HeaderMap, HeaderValue, Method,
    },
    response::Response,
};
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use futures::{stream, Stream, StreamExt};

use super::{Middleware, Next};

/// Compress the response body with `gzip` or `deflate`, whichever the client accepts first.
///
/// `gzip` is preferred when both are accepted. Responses to `HEAD` and `OPTIONS` are left alone.
pub fn content_encoding() -> Middleware {
    Middleware::new(|req: Request, next: Next| async move {
        let encoding = match *req.method() {
            Method::HEAD | Method::OPTIONS => None,
            _ => Encoding::negotiate(req.headers()),
        };

        let response = next.run(req).await;
        match encoding {
            Some(encoding) => encoding.compress(response),
            None => response,
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Gzip,
    Deflate,
}

impl Encoding {
    fn negotiate(headers: &HeaderMap) -> Option<Self> {
        let accept = headers
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");

        if accept.contains("gzip") {
            Some(Encoding::Gzip)
        } else if accept.contains("deflate") {
            Some(Encoding::Deflate)
        } else {
            None
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Encoding::Gzip => "gzip",
            Encoding::Deflate => "deflate",
        }
    }

    fn compress(self, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        parts
            .headers
            .insert(CONTENT_ENCODING, HeaderValue::from_static(self.as_str()));
        parts.headers.remove(CONTENT_LENGTH);

        Response::from_parts(parts, Body::from_stream(encode(self, body)))
    }
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

impl Encoder {
    fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Gzip => Encoder::Gzip(GzEncoder::new(Vec::new(), Compression::default())),
            Encoding::Deflate => {
                Encoder::Deflate(DeflateEncoder::new(Vec::new(), Compression::default()))
            }
        }
    }

    /// Compress `chunk`, returning whatever output the encoder has produced so far.
    fn write(&mut self, chunk: &[u8]) -> io::Result<Bytes> {
        let output = match self {
            Encoder::Gzip(encoder) => {
                encoder.write_all(chunk)?;
                mem::take(encoder.get_mut())
            }
            Encoder::Deflate(encoder) => {
                encoder.write_all(chunk)?;
                mem::take(encoder.get_mut())
            }
        };
        Ok(Bytes::from(output))
    }

    fn finish(self) -> io::Result<Bytes> {
        let output = match self {
            Encoder::Gzip(encoder) => encoder.finish()?,
            Encoder::Deflate(encoder) => encoder.finish()?,
        };
        Ok(Bytes::from(output))
    }
}

fn encode(encoding: Encoding, body: Body) -> impl Stream<Item = io::Result<Bytes>> + Send {
    let state = Some((body.into_data_stream(), Encoder::new(encoding)));

    stream::unfold(state, |state| async move {
        let (mut data, mut encoder) = state?;
        loop {
            match data.next().await {
                Some(Ok(chunk)) => match encoder.write(&chunk) {
                    Ok(output) if output.is_empty() => continue,
                    Ok(output) => return Some((Ok(output), Some((data, encoder)))),
                    Err(err) => return Some((Err(err), None)),
                },
                Some(Err(err)) => return Some((Err(io::Error::other(err)), None)),
                None => return Some((encoder.finish(), None)),
            }
        }
    })
}
