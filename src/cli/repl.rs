//! Interactive chat REPL
//!
//! Reads lines, dispatches slash commands, and drives conversation
//! turns with streamed token output. Input reading, command dispatch,
//! and backend calls are strictly sequential; the only suspension point
//! is the backend call, and an interrupt there abandons the turn
//! without committing a partial reply.

use std::future::Future;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;

use super::commands::{self, Command, ParsedLine};
use crate::llm::{GatewayError, InferenceBackend};
use crate::session::Session;
use crate::transcript::Transcript;

/// Interactive chat session REPL
pub struct ChatRepl {
    session: Session,
    backend: Box<dyn InferenceBackend>,
    interrupt: Arc<Notify>,
}

impl ChatRepl {
    pub fn new(session: Session, backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            session,
            backend,
            interrupt: Arc::new(Notify::new()),
        }
    }

    /// Run the REPL loop until exit or end of input
    pub async fn run(&mut self) -> Result<()> {
        // One listener for the whole session. Ctrl-C interrupts an
        // in-flight reply; at the prompt it is a no-op (notify_waiters
        // wakes only a turn that is currently waiting), so quitting is
        // /exit or end of input.
        let notify = self.interrupt.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                notify.notify_waiters();
            }
        });

        println!("Chat session. Type /help for commands, /exit to quit.");
        println!("Model: {}", self.session.model);
        println!("Ctrl-C interrupts a reply in progress; it does not quit.");
        println!();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("> ");
            stdout.flush()?;

            let mut input = String::new();
            // End of input terminates the session cleanly
            if stdin.lock().read_line(&mut input)? == 0 {
                println!();
                break;
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            match commands::parse(input) {
                ParsedLine::Prompt(text) => self.run_turn(Some(text)).await,
                ParsedLine::Command(command) => {
                    if !self.handle_command(command).await? {
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle one command; returns false when the session should end
    async fn handle_command(&mut self, command: Command<'_>) -> Result<bool> {
        match command {
            Command::Exit => return Ok(false),
            Command::Help => println!("{}", commands::help_text()),
            Command::Clear => {
                self.session.transcript.clear();
                println!("Transcript cleared.");
            }
            Command::SetSystem(text) => {
                self.session.transcript.set_system(text);
                println!("System prompt set.");
            }
            Command::ShowContext => {
                println!("Context window: {}", self.session.context_window);
            }
            Command::SetContext(n) => {
                self.session.context_window = n;
                println!("Context window set to {}.", n);
            }
            Command::Save(filename) => {
                let path = filename.map(str::to_string).unwrap_or_else(|| {
                    format!(
                        "vkllama-{}.json",
                        chrono::Local::now().format("%Y%m%d-%H%M%S")
                    )
                });
                match self.session.transcript.save(path.as_ref()) {
                    Ok(()) => println!("Saved transcript to {}.", path),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Command::Load(filename) => match Transcript::load(filename.as_ref()) {
                Ok(transcript) => {
                    println!("Loaded {} messages from {}.", transcript.len(), filename);
                    self.session.transcript = transcript;
                }
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Continue => {
                if self.session.transcript.is_empty() {
                    eprintln!("Transcript is empty, nothing to continue.");
                } else {
                    self.run_turn(None).await;
                }
            }
            Command::Hack(text) => {
                self.session.transcript.push_user(text);
                print!("assistant> ");
                io::stdout().flush()?;
                let mut reply = String::new();
                if io::stdin().lock().read_line(&mut reply)? == 0 {
                    println!();
                    return Ok(false);
                }
                // The fabricated reply goes in verbatim, minus the line ending
                let reply = reply.trim_end_matches(['\r', '\n']);
                self.session.transcript.push_assistant(reply);
                self.run_turn(None).await;
            }
            Command::Json { pretty } => match self.session.transcript.to_json(pretty) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Invalid(message) => eprintln!("Error: {}", message),
            Command::Unknown(name) => {
                eprintln!("Unknown command: {}. Type /help for available commands.", name);
            }
        }
        Ok(true)
    }

    /// Run one generation turn, streaming tokens to stdout
    async fn run_turn(&mut self, user_text: Option<&str>) {
        let turn = self.session.execute_turn(&*self.backend, user_text, |fragment| {
            print!("{}", fragment);
            let _ = io::stdout().flush();
        });

        match race_interrupt(turn, self.interrupt.notified()).await {
            Some(Ok(())) => {
                println!();
                println!();
            }
            Some(Err(e)) => {
                println!();
                eprintln!("Error: {}", e);
            }
            None => {
                println!();
                eprintln!("Interrupted; partial reply discarded.");
            }
        }
    }
}

/// Race a turn against an interrupt signal
///
/// `None` means the turn future was dropped before its commit point;
/// the fragment stream is abandoned and nothing is committed beyond
/// the user message. Biased so a turn that can finish is never cut
/// short by a simultaneous interrupt.
async fn race_interrupt<F, I>(turn: F, interrupt: I) -> Option<Result<(), GatewayError>>
where
    F: Future<Output = Result<(), GatewayError>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        biased;
        result = turn => Some(result),
        _ = interrupt => None,
    }
}
