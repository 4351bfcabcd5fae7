use std::io::Write as _;

use colored::Colorize;
use futures::future::OptionFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{JoinError, JoinHandle};

use super::input::{InputCommand, parse_input};
use super::render::{render_help, render_sidebar, render_transcript};
use crate::app::AppState;
use crate::chat::{ConversationId, SendError, SendReport, SendState, StoreEvent};

type SendTask = JoinHandle<Result<SendReport, SendError>>;

/// Line-oriented chat loop over stdin/stdout. Returns when stdin closes or on `/quit`.
pub async fn run_terminal(mut app: AppState) -> std::io::Result<()> {
    run_session(&mut app, BufReader::new(tokio::io::stdin())).await
}

/// Drives the chat loop from any line source. A reply still streaming when the
/// input ends or the user quits is finished before queued snapshots are flushed.
pub async fn run_session<R>(app: &mut AppState, input: R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut events = app.store().subscribe();
    let mut lines = input.lines();
    let mut in_flight: Option<SendTask> = None;

    print_screen(app);
    prompt()?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_line(app, &line, &mut in_flight) {
                    break;
                }
                prompt()?;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(app, &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "terminal lagged behind store events");
                    print_screen(app);
                }
                Err(RecvError::Closed) => break,
            },
            Some(finished) = OptionFuture::from(in_flight.as_mut()) => {
                in_flight = None;
                print_finished(app, finished);
                prompt()?;
            }
        }
    }

    if let Some(mut task) = in_flight.take() {
        println!();
        print_notice(app, "waiting for the current reply to finish");
        loop {
            tokio::select! {
                finished = &mut task => {
                    print_finished(app, finished);
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => print_event(app, &event),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => {
                        print_finished(app, (&mut task).await);
                        break;
                    }
                },
            }
        }
    }

    app.shutdown().await;
    Ok(())
}

fn print_finished(app: &AppState, finished: Result<Result<SendReport, SendError>, JoinError>) {
    match finished {
        Ok(Ok(report)) => print_report(app, &report),
        Ok(Err(error)) => print_notice(app, &error.to_string()),
        Err(error) => tracing::error!(error = %error, "send task failed"),
    }
}

/// Returns `false` when the loop should stop.
fn handle_line(app: &mut AppState, line: &str, in_flight: &mut Option<SendTask>) -> bool {
    let command = parse_input(line);
    if in_flight.is_some() && !command.allowed_while_loading() {
        print_notice(app, "a reply is still streaming; wait for it to finish");
        return true;
    }

    match command {
        InputCommand::Send(text) => {
            let controller = app.controller().clone();
            *in_flight = Some(tokio::spawn(async move { controller.send(&text).await }));
        }
        InputCommand::NewChat => {
            app.new_chat();
        }
        InputCommand::List => print!("{}", render_sidebar(&app.sidebar_entries(), app.theme())),
        InputCommand::Open(position) => {
            if app.select_position(position).is_none() {
                print_notice(app, &format!("no conversation at position {position}"));
            }
        }
        InputCommand::ToggleTheme => {
            let theme = app.toggle_theme();
            print_notice(app, &format!("theme: {}", theme.name()));
        }
        InputCommand::Help => println!("{}", render_help()),
        InputCommand::Quit => return false,
        InputCommand::Empty => {}
        InputCommand::Invalid(message) => print_notice(app, &message),
    }
    true
}

fn print_screen(app: &AppState) {
    print!("{}", render_sidebar(&app.sidebar_entries(), app.theme()));
    println!();
    let transcript = app.store().read(|store| {
        render_transcript(store.active_conversation(), app.is_loading(), app.theme())
    });
    print!("{transcript}");
}

fn print_event(app: &AppState, event: &StoreEvent) {
    let palette = app.theme().palette();
    let active = app.active_conversation_id();
    let is_active = |conversation_id: &ConversationId| active.as_ref() == Some(conversation_id);

    match event {
        StoreEvent::ActiveChanged { .. } | StoreEvent::Restored { .. } => {
            println!();
            print_screen(app);
        }
        StoreEvent::MessagesAppended {
            conversation_id, ..
        } if is_active(conversation_id) => {
            print!("{} ", "assistant:".color(palette.assistant).bold());
        }
        StoreEvent::MessagePatched {
            conversation_id,
            delta,
            ..
        } if is_active(conversation_id) => print!("{delta}"),
        StoreEvent::MessageErrored {
            conversation_id,
            content,
            ..
        } if is_active(conversation_id) => {
            println!();
            println!(
                "{} {}",
                "ERROR:".color(palette.error).bold(),
                content.as_str().color(palette.error)
            );
        }
        StoreEvent::TitleChanged {
            conversation_id,
            title,
        } if is_active(conversation_id) => {
            println!();
            println!("{}", format!("title: {title}").color(palette.muted));
        }
        _ => {}
    }
    let _ = std::io::stdout().flush();
}

fn print_report(app: &AppState, report: &SendReport) {
    if app.active_conversation_id().as_ref() != Some(&report.conversation_id) {
        let message = match &report.state {
            SendState::Complete(_) => "reply finished in another conversation",
            _ => "reply failed in another conversation",
        };
        print_notice(app, message);
    } else if report.is_complete() {
        println!();
    }
}

fn print_notice(app: &AppState, message: &str) {
    println!("{}", message.color(app.theme().palette().muted));
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}
