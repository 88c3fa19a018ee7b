//! Interactive clarification session

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use clarifier_core::{ExportFormat, ExportedDocument, Phase, Session, Speaker};
use clarifier_runtime::{ClarificationController, ClarifyError, ErrorKind};

/// A line typed while choosing issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    /// 1-based positions in the issue list
    Toggle(Vec<usize>),
    Add(String),
    Done,
    Restart,
    Quit,
    Help,
    Invalid(String),
}

/// A line typed during the dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueInput {
    /// Empty text skips the question
    Answer(String),
    /// 1-based answer number
    Edit { answer: usize, text: String },
    /// 1-based position in the selected issues; `None` means all
    Focus(Option<usize>),
    End(String),
    Transcript,
    Restart,
    Quit,
    Help,
    Invalid(String),
}

pub fn parse_selection(line: &str) -> SelectionInput {
    let line = line.trim();
    let (head, rest) = split_command(line);

    match head {
        "done" | ":done" => SelectionInput::Done,
        ":restart" => SelectionInput::Restart,
        ":quit" | ":q" => SelectionInput::Quit,
        ":help" | "?" => SelectionInput::Help,
        "add" | ":add" if !rest.is_empty() => SelectionInput::Add(rest.to_string()),
        "add" | ":add" => SelectionInput::Invalid("add needs the issue text".to_string()),
        _ => {
            let numbers: Result<Vec<usize>, _> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(str::parse::<usize>)
                .collect();

            match numbers {
                Ok(numbers) if !numbers.is_empty() && !numbers.contains(&0) => {
                    SelectionInput::Toggle(numbers)
                }
                _ => SelectionInput::Invalid(format!("Not a command: {}", line)),
            }
        }
    }
}

pub fn parse_dialogue(line: &str) -> DialogueInput {
    let line = line.trim();
    if !line.starts_with(':') {
        return DialogueInput::Answer(line.to_string());
    }

    let (head, rest) = split_command(line);
    match head {
        ":end" => DialogueInput::End(rest.to_string()),
        ":transcript" | ":t" => DialogueInput::Transcript,
        ":restart" => DialogueInput::Restart,
        ":quit" | ":q" => DialogueInput::Quit,
        ":help" => DialogueInput::Help,
        ":focus" => match rest {
            "all" | "" => DialogueInput::Focus(None),
            n => match n.parse::<usize>() {
                Ok(n) if n > 0 => DialogueInput::Focus(Some(n)),
                _ => DialogueInput::Invalid(format!("Not an issue number: {}", n)),
            },
        },
        ":edit" => {
            let (n, text) = split_command(rest);
            match n.parse::<usize>() {
                Ok(n) if n > 0 => DialogueInput::Edit {
                    answer: n,
                    text: text.to_string(),
                },
                _ => DialogueInput::Invalid("Usage: :edit <n> <text>".to_string()),
            }
        }
        other => DialogueInput::Invalid(format!("Unknown command: {}", other)),
    }
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    }
}

/// Transcript index of the n-th human answer (1-based).
///
/// `None` when `answer` is 0 or too large to be a transcript position.
pub fn answer_index(answer: usize) -> Option<usize> {
    answer.checked_mul(2)?.checked_sub(1)
}

/// Write an exported document into `dir`, creating it if needed.
pub fn write_document(dir: &Path, document: &ExportedDocument) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(&document.filename);
    fs::write(&path, &document.content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

enum Flow {
    Continue,
    Quit,
}

/// One terminal user working through sessions, one at a time.
pub struct Repl {
    controller: ClarificationController,
    session: Session,
    output_dir: PathBuf,
    format: ExportFormat,
    shown_question: Option<String>,
}

impl Repl {
    pub fn new(controller: ClarificationController, output_dir: PathBuf, format: ExportFormat) -> Self {
        Self {
            controller,
            session: Session::new(),
            output_dir,
            format,
            shown_question: None,
        }
    }

    /// Run the main loop until the user quits.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| anyhow!("Failed to initialize readline: {}", e))?;

        loop {
            if self.session.phase() == Phase::Clarifying {
                self.show_question().await;
            }

            let prompt = match self.session.phase() {
                Phase::NotStarted => "statement> ",
                Phase::IssueSelection => "issues> ",
                Phase::Clarifying => "answer> ",
                Phase::Ended => "> ",
            };

            let line = match rl.readline(&prompt.bright_green().to_string()) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => return Err(anyhow!("Readline error: {}", err)),
            };

            if !line.trim().is_empty() {
                let _ = rl.add_history_entry(line.trim());
            }

            let flow = match self.session.phase() {
                Phase::NotStarted => self.handle_statement(&line).await,
                Phase::IssueSelection => self.handle_selection(&line).await,
                Phase::Clarifying => self.handle_dialogue(&line).await,
                Phase::Ended => self.handle_ended(&line),
            };

            if let Flow::Quit = flow {
                break;
            }
        }

        let usage = self.controller.usage();
        tracing::info!(
            llm_calls = usage.llm_calls,
            total_tokens = usage.total_tokens,
            "REPL finished"
        );
        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "Clarifier".bright_cyan().bold());
        println!(
            "Provider: {} ({})",
            self.controller.provider_name(),
            self.controller.model()
        );
        println!("Type {} for help, {} to quit", ":help".yellow(), ":quit".yellow());
        println!();
        println!("Describe the problem you want to clarify.");
    }

    // ---------------------------------------------------------------------
    // Phase handlers
    // ---------------------------------------------------------------------

    async fn handle_statement(&mut self, line: &str) -> Flow {
        match line.trim() {
            "" => Flow::Continue,
            ":quit" | ":q" => Flow::Quit,
            ":help" => {
                println!("Type your problem statement and press Enter.");
                Flow::Continue
            }
            statement => {
                println!("{}", "Identifying issues...".dimmed());
                match self.controller.start(&mut self.session, statement).await {
                    Ok(()) => {
                        println!();
                        println!("Select the issues to explore: type their numbers to toggle,");
                        println!("{} to suggest your own, {} to continue.", "add <text>".yellow(), "done".yellow());
                        self.print_issues();
                    }
                    Err(err) => report(&err),
                }
                Flow::Continue
            }
        }
    }

    async fn handle_selection(&mut self, line: &str) -> Flow {
        match parse_selection(line) {
            SelectionInput::Toggle(numbers) => {
                let issues: Vec<String> = self
                    .session
                    .all_issues()
                    .into_iter()
                    .map(str::to_string)
                    .collect();

                for n in numbers {
                    match issues.get(n - 1) {
                        Some(issue) => {
                            if let Err(err) = self.controller.toggle_issue(&mut self.session, issue) {
                                report(&err);
                            }
                        }
                        None => println!("{} No issue number {}", "?".yellow(), n),
                    }
                }
                self.print_issues();
            }
            SelectionInput::Add(text) => {
                match self.controller.add_manual_issue(&mut self.session, &text).await {
                    Ok(issue) => {
                        println!("Added: {}", issue.bright_white());
                        self.print_issues();
                    }
                    Err(err) => report(&err),
                }
            }
            SelectionInput::Done => match self.controller.confirm_issues(&mut self.session) {
                Ok(()) => {
                    println!();
                    println!("Answer each question, or press Enter to skip it. {} for commands.", ":help".yellow());
                }
                Err(err) => report(&err),
            },
            SelectionInput::Restart => self.restart(),
            SelectionInput::Quit => return Flow::Quit,
            SelectionInput::Help => print_selection_help(),
            SelectionInput::Invalid(message) => println!("{} {}", "?".yellow(), message),
        }
        Flow::Continue
    }

    async fn handle_dialogue(&mut self, line: &str) -> Flow {
        match parse_dialogue(line) {
            DialogueInput::Answer(text) => {
                if self.session.pending_question().is_none() {
                    // The question request failed; an empty line retries it
                    if !text.is_empty() {
                        println!("{} No question is pending. Press Enter to retry or {} to finish.", "?".yellow(), ":end".yellow());
                    }
                    return Flow::Continue;
                }

                match self.controller.answer(&mut self.session, &text).await {
                    Ok(()) => self.shown_question = None,
                    Err(err) => report(&err),
                }
            }
            DialogueInput::Edit { answer, text } => {
                let Some(index) = answer_index(answer) else {
                    println!("{} No answer number {}", "?".yellow(), answer);
                    return Flow::Continue;
                };
                match self.controller.edit_response(&mut self.session, index, &text).await {
                    Ok(()) => println!("Answer {} updated.", answer),
                    Err(err) => report(&err),
                }
            }
            DialogueInput::Focus(choice) => self.focus(choice),
            DialogueInput::End(text) => {
                println!("{}", "Refining the problem statement...".dimmed());
                match self.controller.end(&mut self.session, &text).await {
                    Ok(()) => {
                        self.shown_question = None;
                        self.print_summary();
                        self.save_summary();
                        println!();
                        println!("Type {} to clarify another problem or {} to exit.", ":restart".yellow(), ":quit".yellow());
                    }
                    Err(err) => report(&err),
                }
            }
            DialogueInput::Transcript => self.print_transcript(),
            DialogueInput::Restart => self.restart(),
            DialogueInput::Quit => return Flow::Quit,
            DialogueInput::Help => print_dialogue_help(),
            DialogueInput::Invalid(message) => println!("{} {}", "?".yellow(), message),
        }
        Flow::Continue
    }

    fn handle_ended(&mut self, line: &str) -> Flow {
        match line.trim() {
            ":restart" => self.restart(),
            ":save" => self.save_summary(),
            ":quit" | ":q" => return Flow::Quit,
            _ => println!(
                "Type {}, {} or {}.",
                ":save".yellow(),
                ":restart".yellow(),
                ":quit".yellow()
            ),
        }
        Flow::Continue
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    /// Print the pending question once, asking for one first if needed.
    async fn show_question(&mut self) {
        match self.controller.request_question(&mut self.session).await {
            Ok(question) => {
                if self.shown_question.as_deref() != Some(question.as_str()) {
                    println!();
                    println!("{} {}", "AI:".bright_blue().bold(), question);
                    self.shown_question = Some(question);
                }
            }
            Err(err) => {
                report(&err);
                println!("Press Enter to try again or {} to finish.", ":end".yellow());
            }
        }
    }

    fn focus(&mut self, choice: Option<usize>) {
        let issue = match choice {
            None => None,
            Some(n) => match self.session.selected_issues().get(n - 1) {
                Some(issue) => Some(issue.clone()),
                None => {
                    println!("{} No selected issue number {}", "?".yellow(), n);
                    return;
                }
            },
        };

        match self.controller.focus(&mut self.session, issue.as_deref()) {
            Ok(()) => match issue {
                Some(issue) => println!("Next questions focus on: {}", issue.bright_white()),
                None => println!("Next questions cover all selected issues."),
            },
            Err(err) => report(&err),
        }
    }

    fn restart(&mut self) {
        self.controller.restart(&mut self.session);
        self.shown_question = None;
        println!();
        println!("Describe the problem you want to clarify.");
    }

    fn print_issues(&self) {
        println!();
        for (i, issue) in self.session.all_issues().iter().enumerate() {
            let mark = if self.session.is_selected(issue) {
                "[x]".bright_green()
            } else {
                "[ ]".normal()
            };
            println!("  {:>2}. {} {}", i + 1, mark, issue);
        }
        println!();
    }

    fn print_transcript(&self) {
        if self.session.transcript().is_empty() {
            println!("{}", "No answers yet.".dimmed());
            return;
        }

        println!();
        for (i, turn) in self.session.transcript().iter().enumerate() {
            match turn.speaker {
                Speaker::Ai => println!("{} {}", "AI:".bright_blue(), turn.text),
                Speaker::Human => println!("{} {}", format!("[{}] You:", i / 2 + 1).bright_green(), turn.text),
            }
        }
        println!();
    }

    fn print_summary(&self) {
        let Some(outcome) = self.session.outcome() else {
            return;
        };

        println!();
        println!("{}", outcome.title.bright_cyan().bold());
        println!();
        println!("{}", "Refined problem statement".bold());
        println!("{}", outcome.refined_statement);
        println!();
        println!("{}", "Feedback".bold());
        println!("{}", outcome.feedback);
    }

    /// Export and write the summary. Failures are reported and the session
    /// stays ended, so `:save` can retry.
    fn save_summary(&self) {
        let saved = self
            .controller
            .export(&self.session, self.format)
            .context("Failed to render summary")
            .and_then(|document| write_document(&self.output_dir, &document));

        match saved {
            Ok(path) => {
                println!();
                println!("Summary saved to {}", path.display().to_string().bright_white());
            }
            Err(err) => {
                tracing::warn!(error = %format!("{:#}", err), "Summary not saved");
                eprintln!("{} {:#}", "x".red().bold(), err);
                println!("Type {} to try again.", ":save".yellow());
            }
        }
    }
}

fn report(err: &ClarifyError) {
    match err.kind() {
        ErrorKind::InputRejected => {
            println!("{} {}. Please rephrase.", "!".yellow().bold(), err);
        }
        ErrorKind::GenerationFailure => {
            println!("{} The model call failed: {}", "x".red().bold(), err);
        }
        ErrorKind::InvariantViolation => {
            println!("{} {}", "?".yellow(), err);
        }
    }
}

fn print_selection_help() {
    println!();
    println!("{}", "Issue selection:".bright_cyan());
    println!("  {:14} Toggle issues by number", "<n> [<n>...]".yellow());
    println!("  {:14} Suggest an issue of your own", "add <text>".yellow());
    println!("  {:14} Continue to the questions", "done".yellow());
    println!("  {:14} Start over", ":restart".yellow());
    println!("  {:14} Exit", ":quit".yellow());
    println!();
}

fn print_dialogue_help() {
    println!();
    println!("{}", "Dialogue:".bright_cyan());
    println!("  {:18} Answer the question (empty line skips it)", "<text>".yellow());
    println!("  {:18} Replace an earlier answer", ":edit <n> <text>".yellow());
    println!("  {:18} Focus questions on one selected issue", ":focus <n>|all".yellow());
    println!("  {:18} Show the answers so far", ":transcript".yellow());
    println!("  {:18} Finish, with an optional last answer", ":end [answer]".yellow());
    println!("  {:18} Start over", ":restart".yellow());
    println!("  {:18} Exit", ":quit".yellow());
    println!();
}
