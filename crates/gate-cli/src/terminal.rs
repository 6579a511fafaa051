//! Drives a gate interactively on a terminal.

use gate_flow::{GateResult, GateStateMachine, GateStep, GateView, Navigator};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

/// How long to wait for the session change that follows a verified code.
const SESSION_WAIT: Duration = Duration::from_secs(10);

/// Prints navigation instead of performing it.
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn push(&self, path: &str) {
        println!("Continue at {}", path);
    }

    fn redirect(&self, url: &str) {
        println!("Open this URL in a browser to sign in:\n\n  {}\n", url);
        println!("Then run `authgate complete-sign-in <callback-url>` with the URL you land on.");
    }
}

/// Outcome of an interactive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The gate closed (completed or dismissed)
    Closed,
    /// The user left for the identity provider
    Redirected,
}

type StdinLines = Lines<BufReader<Stdin>>;

async fn prompt(lines: &mut StdinLines, label: &str) -> std::io::Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

fn show_error(view: &GateView) {
    if let Some(error) = &view.error {
        println!("! {}", error);
    }
}

/// Gate errors mean the input did not fit the current step. Log and redraw.
fn keep_going(result: GateResult<()>) {
    if let Err(e) = result {
        warn!(error = %e, "Gate input ignored");
    }
}

/// Run the gate until it closes or hands off to the identity provider.
/// End of input dismisses the gate.
pub async fn run(gate: &mut GateStateMachine) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    gate.process_events();

    loop {
        let view = gate.view();
        debug!(step = ?view.step, "Rendering gate");

        match view.step {
            GateStep::Closed => return Ok(RunOutcome::Closed),
            GateStep::AwaitingSession => {
                println!("Checking your session...");
                gate.wait_for_events().await;
            }
            GateStep::Login => {
                show_error(&view);
                let Some(input) = prompt(
                    &mut lines,
                    "Phone number ('g' for federated sign-in, 'q' to cancel): ",
                )
                .await?
                else {
                    gate.dismiss();
                    continue;
                };

                match input.as_str() {
                    "q" => gate.dismiss(),
                    "g" => {
                        keep_going(gate.sign_in_with_federated().await);
                        if gate.view().busy {
                            return Ok(RunOutcome::Redirected);
                        }
                    }
                    phone => keep_going(gate.submit_phone(phone).await),
                }
            }
            GateStep::Otp => {
                show_error(&view);
                let label = format!(
                    "Code sent to {} ('b' to go back, 'q' to cancel): ",
                    view.phone
                );
                let Some(input) = prompt(&mut lines, &label).await? else {
                    gate.dismiss();
                    continue;
                };

                match input.as_str() {
                    "q" => gate.dismiss(),
                    "b" => keep_going(gate.back()),
                    code => {
                        keep_going(gate.submit_code(code).await);
                        let after = gate.view();
                        if after.step == GateStep::Otp && after.error.is_none() {
                            let _ = tokio::time::timeout(SESSION_WAIT, gate.wait_for_events()).await;
                        }
                    }
                }
            }
            GateStep::Profile => {
                show_error(&view);
                println!("Almost done. Tell us a little about yourself ('q' to cancel).");

                let label = if view.name.is_empty() {
                    "Name: ".to_string()
                } else {
                    format!("Name [{}]: ", view.name)
                };
                let name = match prompt(&mut lines, &label).await? {
                    Some(name) if name != "q" => name,
                    _ => {
                        gate.dismiss();
                        continue;
                    }
                };
                if !name.is_empty() {
                    gate.set_name(&name);
                }

                let school = match prompt(&mut lines, "School (optional): ").await? {
                    Some(school) if school != "q" => school,
                    _ => {
                        gate.dismiss();
                        continue;
                    }
                };
                gate.set_school(&school);

                keep_going(gate.submit_profile().await);
            }
        }
    }
}
