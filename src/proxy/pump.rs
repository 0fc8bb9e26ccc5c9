//! Flow-controlled body pumps.
//!
//! A pump is a spawned task that reads frames from a source body and
//! pushes them into a bounded channel whose receiving end is the sink body.
//! The source is only polled while the channel has room, so a slow sink
//! pauses the source. When the sink goes away the task stops and drops the
//! source, which resets the other connection.

use axum::body::Body;
use bytes::Bytes;
use futures_util::stream;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body as HttpBody, Frame};
use tokio::sync::mpsc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Frames buffered between source and sink.
pub const PUMP_CAPACITY: usize = 16;

/// Start a pump from `source`, returning the sink body.
pub fn pump<B>(source: B, direction: &'static str) -> Body
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    if source.is_end_stream() {
        return Body::empty();
    }

    let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, BoxError>>(PUMP_CAPACITY);
    tokio::spawn(copy_frames(source, tx, direction));

    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    Body::new(StreamBody::new(frames))
}

async fn copy_frames<B>(
    source: B,
    tx: mpsc::Sender<Result<Frame<Bytes>, BoxError>>,
    direction: &'static str,
) where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let mut source = Box::pin(source);
    loop {
        // Wait for room in the sink before reading the source.
        let Ok(permit) = tx.reserve().await else {
            break;
        };

        let frame = tokio::select! {
            _ = tx.closed() => break,
            frame = source.frame() => frame,
        };

        match frame {
            None => return,
            Some(Ok(frame)) => permit.send(Ok(frame)),
            Some(Err(e)) => {
                let error: BoxError = e.into();
                tracing::warn!(direction, error = %error, "Pump source failed");
                permit.send(Err(error));
                return;
            }
        }
    }
    tracing::debug!(direction, "Pump sink closed, resetting source");
}

/// Read the whole body into memory.
pub async fn buffer<B>(source: B) -> Result<Bytes, BoxError>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let collected = source.collect().await.map_err(|e| -> BoxError { e.into() })?;
    Ok(collected.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn copies_all_frames_in_order() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"hello "))),
            Ok(Frame::data(Bytes::from_static(b"world"))),
        ];
        let source = StreamBody::new(stream::iter(chunks));
        let sink = pump(source, "test");

        let bytes = buffer(sink).await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn source_error_reaches_sink() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"partial"))),
            Err("backend reset".into()),
        ];
        let sink = pump(StreamBody::new(stream::iter(chunks)), "test");
        assert!(buffer(sink).await.is_err());
    }

    #[tokio::test]
    async fn empty_source_yields_empty_body() {
        let sink = pump(Body::empty(), "test");
        assert!(sink.is_end_stream());
    }

    #[tokio::test]
    async fn dropping_sink_stops_the_pump() {
        let (tx, rx) = mpsc::channel::<Result<Frame<Bytes>, BoxError>>(1);
        let source = StreamBody::new(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        let sink = pump(source, "test");
        drop(sink);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tx.is_closed(), "source should be dropped once the sink is gone");
    }
}
