use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::client::ProgressFn;

/// Upper bound on bytes handed out per read. Cancellation is checked at
/// least this often during an upload.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Reader reporting `(bytes_read, total)` after every chunk.
///
/// When the callback breaks, the current and every later read fail, which
/// aborts the HTTP body; the shared flag tells the client why.
pub struct ProgressReader<R> {
    inner: R,
    read_so_far: u64,
    total: u64,
    on_progress: ProgressFn,
    canceled: Arc<AtomicBool>,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, total: u64, on_progress: ProgressFn) -> Self {
        Self {
            inner,
            read_so_far: 0,
            total,
            on_progress,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.canceled.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_canceled() {
            return Err(canceled());
        }
        let len = buf.len().min(CHUNK_SIZE);
        let n = self.inner.read(&mut buf[..len])?;
        if n == 0 {
            return Ok(0);
        }
        self.read_so_far += n as u64;
        if (self.on_progress)(self.read_so_far, self.total).is_break() {
            self.canceled.store(true, Ordering::SeqCst);
            return Err(canceled());
        }
        Ok(n)
    }
}

fn canceled() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "upload canceled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::Cursor,
        ops::ControlFlow,
        sync::{Arc, Mutex},
    };

    #[test]
    fn reports_every_chunk() {
        let data = vec![7u8; 150 * 1024];
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reader = ProgressReader::new(
            Cursor::new(data),
            150 * 1024,
            Box::new(move |read, total| {
                sink.lock().unwrap().push((read, total));
                ControlFlow::Continue(())
            }),
        );

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 150 * 1024);

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 3);
        assert!(seen.windows(2).all(|w| w[1].0 - w[0].0 <= CHUNK_SIZE as u64));
        assert_eq!(seen.last(), Some(&(150 * 1024, 150 * 1024)));
    }

    #[test]
    fn break_aborts_the_read() {
        let mut calls = 0;
        let mut reader = ProgressReader::new(
            Cursor::new(vec![0u8; 4 * CHUNK_SIZE]),
            4 * CHUNK_SIZE as u64,
            Box::new(move |_, _| {
                calls += 1;
                if calls == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }),
        );

        let mut out = Vec::new();
        assert!(reader.read_to_end(&mut out).is_err());
        assert!(reader.is_canceled());
        assert!(reader.read(&mut [0u8; 16]).is_err());
    }
}
