use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Clone)]
enum Step {
    Data(Vec<u8>),
    Fail(io::ErrorKind, String),
}

/// Async reader that serves scripted chunks and errors, then end-of-stream.
///
/// Each `chunk` is delivered by its own read call (split further if the
/// caller's buffer is smaller).
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    steps: VecDeque<Step>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.steps.push_back(Step::Data(bytes.as_ref().to_vec()));
        self
    }

    pub fn fail(mut self, kind: io::ErrorKind, msg: &str) -> Self {
        self.steps.push_back(Step::Fail(kind, msg.to_string()));
        self
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            match this.steps.pop_front() {
                None => return Poll::Ready(Ok(())),
                Some(Step::Data(mut bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    let n = bytes.len().min(buf.remaining());
                    buf.put_slice(&bytes[..n]);
                    let rest = bytes.split_off(n);
                    if !rest.is_empty() {
                        this.steps.push_front(Step::Data(rest));
                    }
                    return Poll::Ready(Ok(()));
                }
                Some(Step::Fail(kind, msg)) => {
                    return Poll::Ready(Err(io::Error::new(kind, msg)));
                }
            }
        }
    }
}
