use std::{
    collections::HashMap,
    io::{self, Write},
    path::PathBuf,
    time::{Duration, Instant},
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute, terminal,
};
use log::info;
use previz_queue::{
    models::error::debug_info, HostTimer, PumpEvent, PumpStatus, TaskId, TaskObserver, TaskState, TaskStatus,
};

use crate::app::{
    cli::{parse_seconds, print_listing},
    session::Session,
};

/// How long to wait for a key while no queue is being polled.
const IDLE_POLL: Duration = Duration::from_millis(500);

const HELP: &str = "\
Commands:
  list                   tasks in the queue
  refresh                reload teams, projects and scenes
  teams                  show the listing; * marks the active scene
  use <project> [scene]  select the active project and scene
  new-project <name>     create a project in the active team
  new-scene <name>       create a scene in the active project
  snapshot <path>        scene snapshot to publish
  publish                export and publish the active scene
  upload <file>...       replace assets of the active project
  sleep <seconds>        cancelable placeholder task
  cancel [id]            cancel one task, or every running task
  remove <id>            remove a finished task
  error <id>             show the error report and debug info of a task
  exit
ESC aborts the running queue.";

/// Repeating timer backed by the terminal event poll timeout.
#[derive(Debug, Default)]
struct TerminalTimer {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl TerminalTimer {
    fn timeout(&self) -> Duration {
        self.next
            .map_or(IDLE_POLL, |next| next.saturating_duration_since(Instant::now()))
    }

    /// True once per elapsed interval.
    fn expired(&mut self) -> bool {
        match (self.interval, self.next) {
            (Some(interval), Some(next)) if Instant::now() >= next => {
                self.next = Some(Instant::now() + interval);
                true
            }
            _ => false,
        }
    }
}

impl HostTimer for TerminalTimer {
    fn add_timer(&mut self, interval: Duration) {
        self.interval = Some(interval);
        self.next = Some(Instant::now() + interval);
    }

    fn remove_timer(&mut self) {
        self.interval = None;
        self.next = None;
    }
}

/// Prints a line whenever a task changes status or label.
#[derive(Default)]
struct ShellObserver {
    seen: HashMap<TaskId, (TaskStatus, String)>,
}

impl TaskObserver for ShellObserver {
    fn task_changed(&mut self, task: Option<&TaskState>) {
        let Some(task) = task else { return };
        let Some(id) = task.id() else { return };
        let key = (task.status(), task.label().to_string());
        if self.seen.get(&id) != Some(&key) {
            println!("\r[{}] {}", id, task.display_line());
            self.seen.insert(id, key);
        }
    }
}

enum Flow {
    Continue,
    Exit,
}

pub fn run_shell(mut session: Session) -> anyhow::Result<()> {
    session.runner.subscribe(ShellObserver::default());

    println!("Previz shell started. Type `help` for commands, `exit` to quit.");
    terminal::enable_raw_mode()?;
    let result = shell_loop(&mut session);
    terminal::disable_raw_mode()?;

    let canceled = session.runner.cancel();
    if canceled > 0 {
        info!("Canceled {} running tasks on exit.", canceled);
    }
    result
}

fn shell_loop(session: &mut Session) -> anyhow::Result<()> {
    let mut timer = TerminalTimer::default();
    let mut history: Vec<String> = Vec::new();
    let mut history_index = 0;
    let mut input = String::new();
    prompt(&input)?;

    loop {
        if event::poll(timer.timeout())? {
            let Event::Key(key) = event::read()? else { continue };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc => {
                    if session.pump.is_running() {
                        let status = session.pump.handle_event(
                            PumpEvent::Escape,
                            &mut session.runner,
                            &mut timer,
                            &mut session.host,
                        );
                        println!("\r\nQueue {:?}.", status);
                        prompt(&input)?;
                    }
                }
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    println!("\r");
                    return Ok(());
                }
                KeyCode::Enter => {
                    println!("\r");
                    let line = std::mem::take(&mut input);
                    if !line.trim().is_empty() {
                        history.push(line.clone());
                    }
                    history_index = history.len();

                    if let Flow::Exit = execute_line(session, &line) {
                        println!("\rExiting the shell...");
                        return Ok(());
                    }
                    // No-op while polling; otherwise it also picks up tasks
                    // an ESC left canceling.
                    session
                        .pump
                        .start(&mut session.runner, &mut timer, &mut session.host);
                    prompt(&input)?;
                }
                KeyCode::Up => {
                    history_index = history_index.saturating_sub(1);
                    if let Some(command) = history.get(history_index) {
                        input = command.clone();
                        prompt(&input)?;
                    }
                }
                KeyCode::Down => {
                    if history_index < history.len() {
                        history_index += 1;
                    }
                    input = history.get(history_index).cloned().unwrap_or_default();
                    prompt(&input)?;
                }
                KeyCode::Backspace => {
                    input.pop();
                    prompt(&input)?;
                }
                KeyCode::Char(c) => {
                    input.push(c);
                    print!("{}", c);
                    io::stdout().flush()?;
                }
                _ => {}
            }
        }

        if timer.expired() {
            let status = session
                .pump
                .handle_event(PumpEvent::Timer, &mut session.runner, &mut timer, &mut session.host);
            if status == PumpStatus::Finished {
                println!("\r\nQueue drained.");
                prompt(&input)?;
            }
        }
    }
}

fn execute_line(session: &mut Session, line: &str) -> Flow {
    let mut args = line.split_whitespace();
    let Some(command) = args.next() else {
        return Flow::Continue;
    };
    let rest: Vec<&str> = args.collect();

    match command {
        "help" => HELP.lines().for_each(|l| println!("\r{}", l)),
        "list" => list_tasks(session),
        "teams" => print_listing(&session.host),
        "refresh" => {
            let task = session.refresh_task();
            session.runner.add_task(&mut session.host, task);
        }
        "use" => match rest.as_slice() {
            [project, scene @ ..] => {
                session.host.select_project(Some(*project));
                session.host.select_scene(scene.first().copied());
                match session.host.scene() {
                    Some(scene) => println!("\rActive scene: {} ({})", scene.title, scene.id),
                    None => println!("\rNo matching scene."),
                }
            }
            [] => println!("\rProject ID must be specified."),
        },
        "new-project" => match (session.host.team().map(|t| t.id.clone()), rest.join(" ")) {
            (_, name) if name.is_empty() => println!("\rProject name must be specified."),
            (None, _) => println!("\rNo active team. Run `refresh` first."),
            (Some(team_id), name) => {
                let task = session.new_project_task(&name, &team_id);
                session.runner.add_task(&mut session.host, task);
            }
        },
        "new-scene" => match (session.host.project().map(|p| p.id.clone()), rest.join(" ")) {
            (_, name) if name.is_empty() => println!("\rScene name must be specified."),
            (None, _) => println!("\rNo active project. Run `refresh` first."),
            (Some(project_id), name) => {
                let task = session.new_scene_task(&name, &project_id);
                session.runner.add_task(&mut session.host, task);
            }
        },
        "snapshot" => match rest.first() {
            Some(path) => {
                session.host.set_snapshot(PathBuf::from(path));
                println!("\rScene snapshot set to {}", path);
            }
            None => println!("\rSnapshot path must be specified."),
        },
        "publish" => {
            let ids = session
                .host
                .project()
                .map(|p| p.id.clone())
                .zip(session.host.scene().map(|s| s.id.clone()));
            match ids {
                Some((project_id, scene_id)) => {
                    let task = session.publish_task(&project_id, &scene_id);
                    session.runner.add_task(&mut session.host, task);
                }
                None => println!("\rNo active scene. Run `refresh` and `use` first."),
            }
        }
        "upload" => match session.host.project().map(|p| p.id.clone()) {
            _ if rest.is_empty() => println!("\rFiles must be specified."),
            Some(project_id) => {
                let files = rest.iter().map(PathBuf::from).collect();
                let task = session.upload_task(&project_id, files);
                session.runner.add_task(&mut session.host, task);
            }
            None => println!("\rNo active project. Run `refresh` first."),
        },
        "sleep" => match parse_seconds(rest.first().copied()) {
            Some(duration) => {
                let task = session.sleep_task(duration);
                let id = session.runner.add_task(&mut session.host, task);
                println!("\rCreated task with ID: {}", id);
            }
            None => println!("\rDuration in seconds must be specified."),
        },
        "cancel" => match rest.first() {
            None => println!("\rCanceling {} tasks.", session.runner.cancel()),
            Some(id) => match parse_id(id).map(|id| session.runner.cancel_task(id)) {
                Some(Ok(true)) => println!("\rSent cancel request for task {}", id),
                Some(Ok(false)) => println!("\rTask {} is not running or cannot be canceled.", id),
                Some(Err(e)) => println!("\r{}", e),
                None => println!("\rInvalid task ID format."),
            },
        },
        "remove" => match rest.first().and_then(|id| parse_id(id)) {
            Some(id) => match session.runner.remove_task(id) {
                Ok(_) => println!("\rRemoved task {}", id),
                Err(e) => println!("\r{}", e),
            },
            None => println!("\rInvalid task ID format."),
        },
        "error" => match rest.first().and_then(|id| parse_id(id)) {
            Some(id) => match session.runner.get(id) {
                Some(task) => match (task.error(), debug_info(task)) {
                    (Some(error), Some(debug)) => {
                        print_block(&error.report(task.label()));
                        print_block(&debug);
                    }
                    _ => println!("\rTask {} has no error.", id),
                },
                None => println!("\rTask {} not found", id),
            },
            None => println!("\rInvalid task ID format."),
        },
        "exit" | "quit" => return Flow::Exit,
        other => println!("\rUnknown command: {}. Type `help` for commands.", other),
    }
    Flow::Continue
}

fn list_tasks(session: &Session) {
    if session.runner.is_empty() {
        println!("\rNo tasks");
        return;
    }
    println!("\r{:<6} {}", "ID", "Task");
    println!("\r{}", "-".repeat(40));
    for (id, task) in session.runner.states() {
        println!("\r{:<6} {}", id, task.display_line());
    }
}

fn parse_id(arg: &str) -> Option<TaskId> {
    arg.parse::<TaskId>().ok()
}

fn print_block(text: &str) {
    for line in text.lines() {
        println!("\r{}", line);
    }
}

fn prompt(input: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    io::stdout().flush()
}
