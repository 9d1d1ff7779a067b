//! Console prompts and plain-text rendering.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{bail, Context, Result};
use client_core::{confirm::ConfirmationGate, Notification, NotificationLevel};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use shared::domain::{Comment, EmailRecord, SupportRequest, Task};

/// Asks on stdin unless `--yes` was given.
pub struct TerminalGate {
    pub assume_yes: bool,
}

impl ConfirmationGate for TerminalGate {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        prompt_line(&format!("{prompt} [y/N]"))
            .map(|answer| is_yes(&answer))
            .unwrap_or(false)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub fn prompt_line(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{label} ")?;
    stdout.flush()?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    if read == 0 {
        bail!("stdin closed while waiting for input");
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Reads a secret without echoing it. Piped input is read as a plain line.
pub fn prompt_password(label: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return prompt_line(label);
    }
    let mut stdout = io::stdout();
    write!(stdout, "{label} ")?;
    stdout.flush()?;

    let mut secret = String::new();
    let outcome = {
        let _raw = RawMode::enable()?;
        loop {
            let Event::Key(key) = event::read().context("failed to read key")? else {
                continue;
            };
            match edit_secret(&mut secret, key) {
                SecretKey::Pending => {}
                outcome => break outcome,
            }
        }
    };
    writeln!(stdout)?;
    if outcome == SecretKey::Cancelled {
        bail!("cancelled");
    }
    Ok(secret)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SecretKey {
    Pending,
    Submitted,
    Cancelled,
}

fn edit_secret(secret: &mut String, key: KeyEvent) -> SecretKey {
    if key.kind != KeyEventKind::Press {
        return SecretKey::Pending;
    }
    match key.code {
        KeyCode::Enter => SecretKey::Submitted,
        KeyCode::Esc => SecretKey::Cancelled,
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            SecretKey::Cancelled
        }
        KeyCode::Backspace => {
            secret.pop();
            SecretKey::Pending
        }
        KeyCode::Char(c) => {
            secret.push(c);
            SecretKey::Pending
        }
        _ => SecretKey::Pending,
    }
}

/// Leaves raw mode when dropped, including on early return.
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("failed to switch terminal to raw mode")?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub fn print_notification(notification: &Notification) {
    match notification.level {
        NotificationLevel::Success => println!("[ok] {}", notification.message),
        NotificationLevel::Error => eprintln!("[error] {}", notification.message),
    }
}

pub fn task_row(task: &Task) -> String {
    let deadline = task
        .deadline
        .map(|deadline| deadline.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<26} {:<10} {:<10} {:<16} {}",
        task.id,
        task.status,
        deadline,
        task.assigned_user,
        task.title
    )
}

pub fn print_task(task: &Task, comments: &[Comment]) {
    println!("{} [{}]", task.title, task.status);
    println!("assigned to: {}", task.assigned_user);
    if let Some(company) = &task.company {
        println!("company:     {company}");
    }
    if let Some(deadline) = task.deadline {
        println!("deadline:    {}", deadline.format("%Y-%m-%d"));
    }
    if !task.description.is_empty() {
        println!("\n{}", task.description);
    }
    println!("\ncomments ({}):", comments.len());
    for comment in comments {
        let author = comment.author();
        println!(
            "  {} {} ({:?}) {}: {}",
            comment.id,
            comment.created_at.format("%Y-%m-%d %H:%M"),
            author.role(),
            author.display_name(),
            comment.text
        );
        for reply in &comment.replies {
            let author = reply.user.clone().unwrap_or_default();
            println!(
                "      ↳ {} {}: {}",
                reply.created_at.format("%Y-%m-%d %H:%M"),
                author.display_name(),
                reply.text
            );
        }
    }
}

pub fn print_requests(requests: &[SupportRequest]) {
    if requests.is_empty() {
        println!("no tickets");
    }
    for request in requests {
        println!(
            "{} {} [{}]",
            request.id,
            request.title,
            request.status.as_deref().unwrap_or("open")
        );
        println!("    {}", request.description);
        for comment in &request.comments {
            let author = comment.user.clone().unwrap_or_default();
            println!("    - {}: {}", author.display_name(), comment.text);
        }
    }
}

pub fn print_emails(emails: &[EmailRecord]) {
    if emails.is_empty() {
        println!("no emails");
    }
    for email in emails {
        let date = email
            .date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!("{} {:<10} {}", email.id, date, email.subject);
        if !email.attachments.is_empty() {
            println!("    attachments: {}", email.attachments.join(", "));
        }
    }
}
