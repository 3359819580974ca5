//! Console driver: one conversation on stdin/stdout.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::conversation::{ConversationState, OutputSink, Outputs, Program};

pub const SHELL_USER_ID: &str = "shelluser";

/// Writes each utterance as a `Bot: <text>` line.
pub struct ConsoleSink<W> {
    out: Mutex<W>,
}

impl<W> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl ConsoleSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

fn format_line(text: &str, media: Option<&str>) -> String {
    match media {
        Some(media) => format!("Bot: {text} [{media}]\n"),
        None => format!("Bot: {text}\n"),
    }
}

#[async_trait]
impl<W> OutputSink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, text: &str, media: Option<&str>) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(format_line(text, media).as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

/// Run `program` against stdin and stdout.
///
/// Returns `None` when stdin closed while the program was still waiting for
/// input.
pub async fn run_console(program: Arc<dyn Program>, config: Option<Value>) -> Result<Option<Outputs>> {
    let input = BufReader::new(tokio::io::stdin());
    run_with_io(program, config, input, Arc::new(ConsoleSink::stdout())).await
}

/// Feed `input` line by line into a fresh conversation until the program
/// finishes, or the input is exhausted and the program waits for more.
pub async fn run_with_io<R>(
    program: Arc<dyn Program>,
    config: Option<Value>,
    input: R,
    sink: Arc<dyn OutputSink>,
) -> Result<Option<Outputs>>
where
    R: AsyncBufRead + Unpin,
{
    let state = Arc::new(ConversationState::new(sink));
    state.memory_set("user_id", SHELL_USER_ID);
    tracing::debug!(session_id = %state.session_id(), program = %program.name(), "console session started");

    let run = program.run(state.clone(), config);
    tokio::pin!(run);

    let mut lines = input.lines();
    let mut input_open = true;
    loop {
        tokio::select! {
            result = &mut run => return result.map(Some),
            line = lines.next_line(), if input_open => match line? {
                Some(line) => state.push_user_input(line),
                None => input_open = false,
            },
            () = state.turns().await_next_request(), if !input_open => {
                tracing::debug!(session_id = %state.session_id(), "input closed while program waits for more");
                return Ok(None);
            }
        }
    }
}
