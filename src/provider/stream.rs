use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use super::ChunkStream;
use crate::errors::ModelError;

/// What a provider makes of one line of a streamed body.
#[derive(Debug)]
pub enum Frame {
    Chunk(String),
    Skip,
    Done,
    Error(ModelError),
}

/// Splits an arbitrary byte feed into lines, holding back partial lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Remaining partial line once the feed has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Payload of a server-sent-events `data:` line.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

struct DecodeState<S, F> {
    inner: Pin<Box<S>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    parse: F,
    idle: Duration,
    eof: bool,
    finished: bool,
}

/// Turn a streamed response body into text chunks, one parsed line at a time.
///
/// The result is single-pass and ends at the first `Frame::Done`, the first
/// error, or the end of the body. A body that stays silent for longer than
/// `idle` ends with `Unavailable`; a slow but live body is never cut off.
pub fn decode<S, E, F>(body: S, idle: Duration, parse: F) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    F: FnMut(&str) -> Frame + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(body),
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        parse,
        idle,
        eof: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if let Some(line) = st.pending.pop_front() {
                if line.trim().is_empty() {
                    continue;
                }
                match (st.parse)(&line) {
                    Frame::Chunk(c) => return Some((Ok(c), st)),
                    Frame::Skip => continue,
                    Frame::Done => return None,
                    Frame::Error(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }
            if st.eof {
                return None;
            }
            let next = match tokio::time::timeout(st.idle, st.inner.next()).await {
                Ok(next) => next,
                Err(_) => {
                    st.finished = true;
                    let msg = format!("no data from backend for {}s", st.idle.as_secs_f32());
                    return Some((Err(ModelError::Unavailable(msg)), st));
                }
            };
            match next {
                Some(Ok(bytes)) => {
                    let lines = st.decoder.push(&bytes);
                    st.pending.extend(lines);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ModelError::unavailable(e)), st));
                }
                None => {
                    st.eof = true;
                    if let Some(rest) = st.decoder.finish() {
                        st.pending.push_back(rest);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let items: Vec<Result<Bytes, String>> = parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        stream::iter(items)
    }

    const IDLE: Duration = Duration::from_secs(5);

    /// One line every `every`, `n` times.
    fn paced(n: usize, every: Duration) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        stream::unfold(0usize, move |i| async move {
            if i == n {
                return None;
            }
            tokio::time::sleep(every).await;
            Some((Ok(Bytes::from(format!("part{i}\n"))), i + 1))
        })
    }

    fn plain(line: &str) -> Frame {
        if line == "END" {
            Frame::Done
        } else {
            Frame::Chunk(line.to_string())
        }
    }

    #[test]
    fn decoder_holds_partial_lines() {
        let mut d = LineDecoder::default();
        assert_eq!(d.push(b"ab"), Vec::<String>::new());
        assert_eq!(d.push(b"c\r\nde\nf"), vec!["abc".to_string(), "de".to_string()]);
        assert_eq!(d.finish(), Some("f".to_string()));
        assert_eq!(d.finish(), None);
    }

    #[test]
    fn sse_data_strips_prefix() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("event: ping"), None);
    }

    #[tokio::test]
    async fn decode_preserves_order_across_split_bytes() {
        let chunks: Vec<String> = decode(body(&["one\ntw", "o\n", "three"]), IDLE, plain)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn decode_stops_at_done() {
        let chunks: Vec<String> = decode(body(&["a\nEND\nb\n"]), IDLE, plain)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["a"]);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let items: Vec<Result<Bytes, String>> = vec![Ok(Bytes::from_static(b"a\n")), Err("reset".into())];
        let out: Vec<Result<String, ModelError>> = decode(stream::iter(items), IDLE, plain).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(ModelError::Unavailable(ref m)) if m.contains("reset")));
    }

    #[tokio::test]
    async fn slow_but_live_body_is_read_to_the_end() {
        // Total runtime is well past the idle limit; each gap is not.
        let out: Vec<Result<String, ModelError>> =
            decode(paced(6, Duration::from_millis(60)), Duration::from_millis(150), plain).collect().await;
        let chunks: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(chunks, vec!["part0", "part1", "part2", "part3", "part4", "part5"]);
    }

    #[tokio::test]
    async fn stalled_body_ends_with_unavailable() {
        let stalled = body(&["a\n"]).chain(stream::pending());
        let out: Vec<Result<String, ModelError>> =
            decode(stalled, Duration::from_millis(50), plain).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().ok(), Some("a"));
        assert!(matches!(out[1], Err(ModelError::Unavailable(ref m)) if m.contains("no data")));
    }
}
