// Twin Interactive Console
// Chat with an avatar turn by turn; a new line interrupts the current reply

use anyhow::Result;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use twin_core::{ConversationTurn, IdentityHandle};
use twin_me::{AvatarError, ConversationPipeline};

pub struct ConversationConsole {
    pipeline: Arc<ConversationPipeline>,
    identity: IdentityHandle,
    history: Vec<ConversationTurn>,
    prompt: String,
}

enum CommandResult {
    Continue,
    Exit,
    Error(String),
    Output(String),
}

impl ConversationConsole {
    pub fn new(pipeline: Arc<ConversationPipeline>, identity: IdentityHandle) -> Self {
        let prompt = format!("you@{}", identity.avatar_id());
        Self {
            pipeline,
            identity,
            history: Vec::new(),
            prompt,
        }
    }

    /// Start the interactive console
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();
        self.print_help();

        let stdin = io::stdin();
        let mut stdin = BufReader::new(stdin.lock());

        loop {
            print!("{}> ", self.prompt);
            io::stdout().flush()?;

            let mut line = String::new();
            if stdin.read_line(&mut line)? == 0 {
                break;
            }

            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            match self.handle_line(&line).await {
                CommandResult::Continue => continue,
                CommandResult::Exit => break,
                CommandResult::Error(msg) => println!("❌ Error: {}", msg),
                CommandResult::Output(output) => println!("{}", output),
            }
        }

        println!("\n👋 Goodbye!");
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!("Talking to avatar {}", self.identity.avatar_id());
        match self.identity.voice_id() {
            Some(voice) => println!("Voice: {}", voice),
            None => println!("Voice: service default"),
        }
        println!("Type a message, or '/help' for commands");
        println!();
    }

    fn print_help(&self) {
        println!("📚 Available Commands:");
        println!("  /help, /?        - Show this help message");
        println!("  /exit, /quit     - Exit the console");
        println!("  /history         - Show this conversation");
        println!("  /status          - Show lip-sync playback status");
        println!("  /clear           - Clear the screen");
        println!();
    }

    async fn handle_line(&mut self, line: &str) -> CommandResult {
        if let Some(command) = line.strip_prefix('/') {
            return self.handle_command(command);
        }

        self.history.push(ConversationTurn::user(line));
        match self.pipeline.converse(&self.identity, line).await {
            Ok(reply) => {
                self.history.push(ConversationTurn::agent(reply.text.clone()));
                CommandResult::Output(format!("🤖 {}", reply.text))
            }
            Err(AvatarError::Superseded) => CommandResult::Continue,
            Err(e) => CommandResult::Error(e.to_string()),
        }
    }

    fn handle_command(&self, command: &str) -> CommandResult {
        match command.trim().to_lowercase().as_str() {
            "exit" | "quit" | "q" => CommandResult::Exit,
            "help" | "?" => {
                self.print_help();
                CommandResult::Continue
            }
            "history" => {
                if self.history.is_empty() {
                    return CommandResult::Output("No turns yet".to_string());
                }
                let lines: Vec<String> = self
                    .history
                    .iter()
                    .map(|turn| {
                        format!(
                            "  [{}] {}: {}",
                            turn.timestamp.format("%H:%M:%S"),
                            turn.role,
                            turn.text
                        )
                    })
                    .collect();
                CommandResult::Output(lines.join("\n"))
            }
            "status" => {
                let status = self.pipeline.player().status();
                CommandResult::Output(format!(
                    "turn {} {:?}: {:?} elapsed, {} visemes pending, jaw {:.2} smile {:.2} pucker {:.2}",
                    status.turn,
                    status.state,
                    status.elapsed,
                    status.pending,
                    status.pose.jaw_open,
                    status.pose.mouth_smile,
                    status.pose.mouth_pucker
                ))
            }
            "clear" | "cls" => {
                print!("\x1B[2J\x1B[1;1H");
                let _ = io::stdout().flush();
                CommandResult::Continue
            }
            other => CommandResult::Error(format!("Unknown command '/{}'", other)),
        }
    }
}
