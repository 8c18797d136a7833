//! Human-in-the-loop resolution of one-time authorization codes
//!
//! The identity pool never talks to a terminal directly. It hands an
//! `AuthorizationPrompt` to a `CredentialResolver` and gets a code back.
//! `ConsoleResolver` is the production implementation; tests supply canned
//! codes through their own resolver.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::info;

use crate::authorize::extract_code;
use crate::error::{Error, Result};

/// What the human needs to authorize one identity.
#[derive(Debug)]
pub struct AuthorizationPrompt<'a> {
    pub authorize_url: &'a str,
    pub handle: &'a str,
    pub secret: &'a Secret<String>,
    pub state: &'a str,
}

/// Turns an authorize URL into a one-time code.
///
/// Return `Error::ResolverClosed` when no code can ever be produced; any
/// other error makes the caller prompt again.
pub trait CredentialResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        prompt: AuthorizationPrompt<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

struct Console<R, W> {
    reader: R,
    writer: W,
}

/// Prompts on a writer (stderr in production) and reads the redirected URL
/// from a line-oriented reader (stdin in production).
pub struct ConsoleResolver<R, W> {
    io: Mutex<Console<R, W>>,
}

impl ConsoleResolver<BufReader<tokio::io::Stdin>, tokio::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr())
    }
}

impl<R, W> ConsoleResolver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new(Console { reader, writer }),
        }
    }
}

impl<R, W> CredentialResolver for ConsoleResolver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn resolve<'a>(
        &'a self,
        prompt: AuthorizationPrompt<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let mut io = self.io.lock().await;
            info!(handle = prompt.handle, "waiting for interactive authorization");

            let text = format!(
                "\nOpen this URL and log in to obtain an authorization code:\n{}\n\
                 Log in as:\n  {}\n  {}\nPaste the redirected URL (or the code) and press Enter:\n-> ",
                prompt.authorize_url,
                prompt.handle,
                prompt.secret.expose(),
            );
            io.writer
                .write_all(text.as_bytes())
                .await
                .map_err(|e| Error::Io(format!("writing authorization prompt: {e}")))?;
            io.writer
                .flush()
                .await
                .map_err(|e| Error::Io(format!("flushing authorization prompt: {e}")))?;

            let mut line = String::new();
            let read = io
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| Error::Io(format!("reading authorization input: {e}")))?;
            if read == 0 {
                return Err(Error::ResolverClosed("console input reached end of file".into()));
            }

            extract_code(&line, Some(prompt.state))
        })
    }
}
