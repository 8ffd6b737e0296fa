//! A queue speaking JSON lines.
//!
//! Each input line is one delivery, `{"tag": 7, "task": {"kind": "merge", ...}}`.
//! Replies are written as one JSON object per line, tagged by `reply`;
//! settlements are written as `{"settle": 7, "disposition": "accepted"}`.
//! End of input is the shutdown signal. Malformed input lines are logged
//! and skipped.

use std::io::{BufRead, Write};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use shipyard_types::Disposition;
use tracing::{debug, warn};

use crate::error::Result;
use crate::queue::{Delivery, DeliveryTag, Reply, TaskQueue};

#[derive(Serialize)]
struct Settlement {
    settle: DeliveryTag,
    disposition: Disposition,
}

/// A [`TaskQueue`] over a line reader and a writer.
pub struct JsonLinesQueue<R, W> {
    input: Mutex<R>,
    output: Mutex<W>,
}

impl<R, W> JsonLinesQueue<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Consume the queue, returning the writer.
    pub fn into_output(self) -> W {
        self.output
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line<T: Serialize>(&self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        output.write_all(&line)?;
        output.flush()?;
        Ok(())
    }
}

impl<R, W> TaskQueue for JsonLinesQueue<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn receive(&self) -> Result<Option<Delivery>> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                debug!("end of task input");
                return Ok(None);
            }
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str::<Delivery>(text) {
                Ok(delivery) => return Ok(Some(delivery)),
                Err(e) => warn!(error = %e, line = %text, "skipping malformed task line"),
            }
        }
    }

    fn publish(&self, reply: Reply) -> Result<()> {
        self.write_line(&reply)
    }

    fn settle(&self, tag: DeliveryTag, disposition: Disposition) -> Result<()> {
        self.write_line(&Settlement {
            settle: tag,
            disposition,
        })
    }
}
