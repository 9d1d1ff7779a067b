use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use client_core::{
    paginate,
    profile::read_upload,
    Affirmed, DeadlineRange, DeleteComment, DeleteTask, DocumentUpload, EmailDraft,
    PortalClient, ProfileForm, RecoveryError, Route, Submission, TaskFilter,
};
use shared::domain::{CommentId, DocumentKind, RequestId, StudentId, TaskId, TaskStatus};
use tracing::info;

use crate::{
    terminal::{self, prompt_line, prompt_password, TerminalGate},
    Command, EmailCommand, ProfileCommand, ProfileUpdateArgs, RequestCommand, TaskCommand,
    TaskListArgs,
};

const OTP_ATTEMPTS: usize = 3;

pub async fn require_session(portal: &PortalClient) -> Result<()> {
    match portal.restore_session(Utc::now()).await {
        Route::Home => Ok(()),
        _ => bail!("not signed in; run `portal login <email>` first"),
    }
}

pub async fn run(portal: &PortalClient, command: Command, assume_yes: bool) -> Result<()> {
    let gate = TerminalGate { assume_yes };
    match command {
        Command::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => prompt_password("password:")?,
            };
            portal.login(&email, &password).await?;
            println!("signed in as {}", email.trim());
        }
        Command::Logout => {
            portal.logout().await;
            println!("signed out");
        }
        Command::Recover { email } => recover(portal, email).await?,
        Command::Profile { action } => profile(portal, action).await?,
        Command::Tasks(args) => list_tasks(portal, args).await?,
        Command::Task { id, action } => task(portal, TaskId::new(id), action, &gate).await?,
        Command::Requests { action } => requests(portal, action).await?,
        Command::Email { action } => email(portal, action).await?,
    }
    Ok(())
}

async fn recover(portal: &PortalClient, email: Option<String>) -> Result<()> {
    let mut recovery = portal.password_recovery();
    let email = match email {
        Some(email) => email,
        None => prompt_line("email:")?,
    };
    recovery.submit_email(&email).await?;
    println!("an OTP was sent to {}", email.trim());

    let mut attempts = 0;
    loop {
        let otp = prompt_line("OTP:")?;
        match recovery.submit_otp(&otp).await {
            Ok(_) => break,
            Err(err @ (RecoveryError::Validation(_) | RecoveryError::Request { .. })) => {
                attempts += 1;
                if attempts >= OTP_ATTEMPTS {
                    return Err(err.into());
                }
                eprintln!("{err}; try again");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let redirect = loop {
        let password = prompt_password("new password:")?;
        let confirmation = prompt_password("confirm password:")?;
        match recovery.submit_new_password(&password, &confirmation).await {
            Ok(redirect) => break redirect,
            Err(RecoveryError::Validation(message)) => eprintln!("{message}"),
            Err(err) => return Err(err.into()),
        }
    };
    info!(route = ?redirect.route, "password recovery finished");
    println!("password changed; sign in with `portal login {}`", email.trim());
    Ok(())
}

async fn profile(portal: &PortalClient, action: ProfileCommand) -> Result<()> {
    match action {
        ProfileCommand::Show => {
            let profile = portal.fetch_profile().await?;
            println!("name:       {}", profile.full_name());
            println!("email:      {}", profile.email.as_deref().unwrap_or("-"));
            println!("university: {}", profile.university_name.as_deref().unwrap_or("-"));
            println!("country:    {}", profile.country_name.as_deref().unwrap_or("-"));
            if !profile.contact_numbers.is_empty() {
                println!("contacts:   {}", profile.contact_numbers.join(", "));
            }
            for (kind, url, name) in profile.documents() {
                println!("  {:<18} {name:<24} {url}", kind.field_name());
            }
        }
        ProfileCommand::Update(args) => {
            let (form, uploads) = profile_update(args).await?;
            let uploaded = portal.update_profile(&form, uploads).await?;
            for (kind, url) in uploaded {
                println!("uploaded {} -> {url}", kind.field_name());
            }
        }
        ProfileCommand::Download { dir } => {
            let profile = portal.fetch_profile().await?;
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("failed to create '{}'", dir.display()))?;
            for (_, url, name) in profile.documents() {
                let stem = Path::new(&name)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or(&name)
                    .to_string();
                let file = portal.download_document(&url, &stem).await?;
                let target = dir.join(&file.file_name);
                tokio::fs::write(&target, &file.bytes)
                    .await
                    .with_context(|| format!("failed to write '{}'", target.display()))?;
                println!("saved {}", target.display());
            }
        }
    }
    Ok(())
}

async fn profile_update(args: ProfileUpdateArgs) -> Result<(ProfileForm, Vec<DocumentUpload>)> {
    let mut uploads = Vec::with_capacity(args.documents.len());
    for entry in &args.documents {
        let (kind, path) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("document '{entry}' must look like kind=path"))?;
        let kind: DocumentKind = kind.parse().map_err(|err: String| anyhow!(err))?;
        uploads.push(DocumentUpload {
            kind,
            file: read_upload(Path::new(path)).await?,
        });
    }

    let form = ProfileForm {
        name: args.name,
        age: args.age,
        gender: args.gender,
        contact_numbers: args.contacts,
        account_number: args.account_number,
        confirm_account_number: args.confirm_account_number,
        branch_name: args.branch,
        university_name: args.university,
        country_name: args.country,
        current_email: args.current_email,
    };
    Ok((form, uploads))
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

fn task_filter(args: &TaskListArgs) -> Result<TaskFilter> {
    let status = args
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let deadline = match (&args.from, &args.to) {
        (None, None) => None,
        (from, to) => {
            let from = from.as_deref().map(parse_day).transpose()?.unwrap_or(NaiveDate::MIN);
            let to = to.as_deref().map(parse_day).transpose()?.unwrap_or(NaiveDate::MAX);
            Some(DeadlineRange { from, to })
        }
    };
    Ok(TaskFilter {
        status,
        assigned: args.assigned.clone(),
        company: args.company.clone(),
        deadline,
    })
}

async fn list_tasks(portal: &PortalClient, args: TaskListArgs) -> Result<()> {
    let filter = task_filter(&args)?;
    let tasks = portal.my_tasks().await?;
    let matching: Vec<_> = filter.apply(&tasks).into_iter().cloned().collect();
    let page = paginate(&matching, args.page);

    for task in page.items {
        println!("{}", terminal::task_row(task));
    }
    println!(
        "page {}/{} ({} of {} tasks match)",
        page.number,
        page.total_pages,
        matching.len(),
        tasks.len()
    );
    Ok(())
}

async fn task(
    portal: &PortalClient,
    task_id: TaskId,
    action: TaskCommand,
    gate: &TerminalGate,
) -> Result<()> {
    let thread = portal.task_thread(task_id.clone());
    let task = thread.load_task().await?;

    match action {
        TaskCommand::Show => {
            terminal::print_task(&task, &thread.comments().await);
        }
        TaskCommand::Status { status, assigned } => {
            let status: TaskStatus = status.parse()?;
            let assigned = assigned.unwrap_or(task.assigned_user);
            let updated = thread.update_status(status, &assigned).await?;
            println!("{} is now {} (assigned to {})", updated.id, updated.status, updated.assigned_user);
        }
        TaskCommand::Comment { text } => {
            let mut draft = text;
            report_submission(thread.add_comment(&mut draft).await?);
        }
        TaskCommand::Reply { comment_id, text } => {
            let mut draft = text;
            let parent = CommentId::new(comment_id);
            report_submission(thread.add_reply(&parent, &mut draft).await?);
        }
        TaskCommand::DeleteComment { comment_id } => {
            let action = DeleteComment {
                task_id,
                comment_id: CommentId::new(comment_id),
            };
            let Some(confirmation) = Affirmed::request(gate, action) else {
                println!("cancelled");
                return Ok(());
            };
            thread.delete_comment(confirmation).await?;
            println!("comment deleted; {} left", thread.comments().await.len());
        }
        TaskCommand::Delete => {
            let Some(confirmation) = Affirmed::request(gate, DeleteTask { task_id }) else {
                println!("cancelled");
                return Ok(());
            };
            thread.delete_task(confirmation).await?;
        }
    }
    Ok(())
}

fn report_submission(submission: Submission) {
    match submission {
        Submission::Applied => println!("posted"),
        Submission::Skipped => println!("nothing to post"),
    }
}

async fn requests(portal: &PortalClient, action: RequestCommand) -> Result<()> {
    let listed = match action {
        RequestCommand::List => portal.my_requests().await?,
        RequestCommand::New { title, description } => {
            portal.raise_request(&title, &description).await?
        }
        RequestCommand::Comment { id, text } => {
            let mut draft = text;
            match portal
                .comment_on_request(&RequestId::new(id), &mut draft)
                .await?
            {
                Some(listed) => listed,
                None => {
                    println!("nothing to post");
                    return Ok(());
                }
            }
        }
    };
    terminal::print_requests(&listed);
    Ok(())
}

async fn email(portal: &PortalClient, action: EmailCommand) -> Result<()> {
    match action {
        EmailCommand::List { student_id } => {
            let emails = portal.list_emails(&StudentId::new(student_id)).await?;
            terminal::print_emails(&emails);
        }
        EmailCommand::Send {
            student_id,
            message,
            attachments,
            reply_to,
        } => {
            let student_id = StudentId::new(student_id);
            let mut draft = match reply_to {
                Some(email_id) => {
                    let mailbox = portal.list_emails(&student_id).await?;
                    let original = mailbox
                        .iter()
                        .find(|email| email.id.as_str() == email_id)
                        .ok_or_else(|| anyhow!("no email {email_id} for student {student_id}"))?;
                    EmailDraft::reply_to(original)
                }
                None => EmailDraft::default(),
            };
            if let Some(message) = message {
                draft.message = if draft.message.is_empty() {
                    message
                } else {
                    format!("{message}\n\n{}", draft.message)
                };
            }
            draft.attachments = attachments
                .iter()
                .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
                .map(str::to_string)
                .collect();

            let mailbox = portal.send_email(&student_id, &mut draft).await?;
            terminal::print_emails(&mailbox);
        }
    }
    Ok(())
}
