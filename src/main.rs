use anyhow::Context;
use rotor::app::RotorApp;
use rotor::config::RotorConfig;
use rotor::select::SelectionRequest;
use rotor::telemetry;

enum CliCommand {
    Probe {
        session: Option<u64>,
        dry: bool,
        json: bool,
    },
    Select {
        session: Option<u64>,
        count: Option<usize>,
        exclude: Vec<String>,
        require: Vec<String>,
        commit: bool,
        json: bool,
    },
    Triage {
        platform: Option<String>,
        all: bool,
        json: bool,
    },
    Reconcile {
        session: u64,
        json: bool,
    },
    Help,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    let command = parse_cli_args()?;
    if matches!(command, CliCommand::Help) {
        print_help();
        return Ok(());
    }

    let config = RotorConfig::load().context("failed to load configuration")?;
    let app = RotorApp::new(config).context("failed to construct application")?;

    match command {
        CliCommand::Probe { session, dry, json } => {
            let session = session.unwrap_or_else(|| app.next_session());
            let report = app.run_probe(session, dry).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_probe_report(&report, session, dry);
            }
        }
        CliCommand::Select {
            session,
            count,
            exclude,
            require,
            commit,
            json,
        } => {
            let request = SelectionRequest {
                session: session.unwrap_or_else(|| app.next_session()),
                count,
                exclude,
                require,
                commit,
            };
            let outcome = app.select(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_selection(&outcome, commit);
            }
        }
        CliCommand::Triage {
            platform,
            all,
            json,
        } => {
            let reports = if all {
                app.triage_all().await?
            } else if let Some(platform) = platform {
                vec![app.triage(&platform).await?]
            } else {
                anyhow::bail!("triage needs a platform identifier or --all");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_triage_report(report);
                }
                if reports.is_empty() {
                    println!("nothing to triage: no tripped or degraded platforms");
                }
            }
        }
        CliCommand::Reconcile { session, json } => match app.reconcile(session)? {
            Some(outcome) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    print_reconcile_outcome(&outcome);
                }
            }
            None => {
                anyhow::bail!("no mandate recorded for session {session}");
            }
        },
        CliCommand::Help => unreachable!("handled before config load"),
    }

    Ok(())
}

fn parse_cli_args() -> anyhow::Result<CliCommand> {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        return Ok(CliCommand::Help);
    };

    match command.as_str() {
        "probe" => {
            let mut session = None;
            let mut dry = false;
            let mut json = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--session" => session = Some(parse_value(&mut args, &arg)?),
                    "--dry" => dry = true,
                    "--json" => json = true,
                    other => anyhow::bail!("unrecognised argument `{other}`"),
                }
            }
            Ok(CliCommand::Probe { session, dry, json })
        }
        "select" => {
            let mut session = None;
            let mut count = None;
            let mut exclude = Vec::new();
            let mut require = Vec::new();
            let mut commit = false;
            let mut json = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--session" => session = Some(parse_value(&mut args, &arg)?),
                    "--count" => count = Some(parse_value(&mut args, &arg)?),
                    "--exclude" => exclude.push(expect_value(&mut args, &arg)?),
                    "--require" => require.push(expect_value(&mut args, &arg)?),
                    "--commit" => commit = true,
                    "--json" => json = true,
                    other => anyhow::bail!("unrecognised argument `{other}`"),
                }
            }
            Ok(CliCommand::Select {
                session,
                count,
                exclude,
                require,
                commit,
                json,
            })
        }
        "triage" => {
            let mut platform = None;
            let mut all = false;
            let mut json = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--all" => all = true,
                    "--json" => json = true,
                    other if other.starts_with('-') => {
                        anyhow::bail!("unrecognised argument `{other}`")
                    }
                    other => {
                        if platform.is_some() {
                            anyhow::bail!("triage takes a single platform identifier");
                        }
                        platform = Some(other.to_string());
                    }
                }
            }
            if platform.is_none() && !all {
                anyhow::bail!("triage needs a platform identifier or --all");
            }
            Ok(CliCommand::Triage {
                platform,
                all,
                json,
            })
        }
        "reconcile" => {
            let mut session = None;
            let mut json = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--json" => json = true,
                    other if other.starts_with('-') => {
                        anyhow::bail!("unrecognised argument `{other}`")
                    }
                    other => {
                        session = Some(other.parse().context("session must be an integer")?)
                    }
                }
            }
            let session = session
                .ok_or_else(|| anyhow::anyhow!("reconcile needs a session ordinal"))?;
            Ok(CliCommand::Reconcile { session, json })
        }
        "-h" | "--help" | "help" => Ok(CliCommand::Help),
        other => anyhow::bail!("unrecognised command `{other}`"),
    }
}

fn expect_value<I>(args: &mut I, flag: &str) -> anyhow::Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .ok_or_else(|| anyhow::anyhow!("expected value after {flag}"))
}

fn parse_value<I, T>(args: &mut I, flag: &str) -> anyhow::Result<T>
where
    I: Iterator<Item = String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    expect_value(args, flag)?
        .parse()
        .with_context(|| format!("invalid value for {flag}"))
}

fn print_probe_report(report: &rotor::probe::ProbePassReport, session: u64, dry: bool) {
    for outcome in &report.outcomes {
        let mark = if outcome.verdict.healthy {
            "ok"
        } else if outcome.verdict.reachable {
            "degraded"
        } else {
            "down"
        };
        let source = if outcome.from_cache { " (cached)" } else { "" };
        match outcome.verdict.status_code {
            Some(status) => println!("  {:<16} {mark} [{status}]{source}", outcome.platform),
            None => println!(
                "  {:<16} {mark} ({}){source}",
                outcome.platform,
                outcome.verdict.error.as_deref().unwrap_or("no response")
            ),
        }
    }
    for skip in &report.skipped {
        println!("  {:<16} skipped: {}", skip.platform, skip.reason);
    }
    println!();
    println!(
        "session {session}: probed {} ({} cached), {} reachable, {} healthy, {} skipped{}{}",
        report.total_probed,
        report.served_from_cache,
        report.reachable,
        report.healthy,
        report.skipped.len(),
        if report.budget_exceeded {
            ", pass budget exceeded"
        } else {
            ""
        },
        if dry { " [dry run]" } else { "" },
    );
}

fn print_selection(outcome: &rotor::select::SelectionOutcome, commit: bool) {
    println!(
        "session {}: selected {}",
        outcome.session,
        outcome.selected.join(", ")
    );
    if !outcome.first_contact.is_empty() {
        println!("first contact: {}", outcome.first_contact.join(", "));
    }
    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }
    if !commit {
        println!("(advisory pick, no mandate recorded; rerun with --commit)");
    }
}

fn print_triage_report(report: &rotor::triage::TriageReport) {
    println!(
        "{}: {} -> {}",
        report.result.platform, report.result.category, report.result.action
    );
    for evidence in &report.result.evidence {
        println!("  - {evidence}");
    }
}

fn print_reconcile_outcome(outcome: &rotor::reconcile::ReconcileOutcome) {
    println!(
        "session {}: {}% compliant ({} engaged, {} documented skips, {} missing)",
        outcome.session,
        outcome.compliance_pct,
        outcome.engaged.len(),
        outcome.documented_skips.len(),
        outcome.missing.len(),
    );
    if !outcome.missing.is_empty() {
        println!("missing: {}", outcome.missing.join(", "));
    }
    if outcome.already_recorded {
        println!("(session was already reconciled; nothing recorded)");
    }
    if outcome.escalated {
        println!("escalation follow-up appended to the session trace");
    }
}

fn print_help() {
    println!("rotor - platform rotation core");
    println!();
    println!("USAGE:");
    println!("    rotor <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    probe                Run a liveness pass over the registry");
    println!("        --session <N>    Session ordinal (default: next unused)");
    println!("        --dry            Compute the report without persisting state");
    println!("        --json           Emit the full report as JSON");
    println!("    select               Pick platforms for a session");
    println!("        --session <N>    Session ordinal (default: next unused)");
    println!("        --count <N>      Number of platforms to pick");
    println!("        --exclude <ID>   Exclude a platform (repeatable)");
    println!("        --require <ID>   Force-include a platform (repeatable)");
    println!("        --commit         Record the mandate and recency stamps");
    println!("        --json           Emit the selection as JSON");
    println!("    triage <ID>          Classify one degraded platform");
    println!("    triage --all         Classify every tripped or degraded platform");
    println!("        --json           Emit triage reports as JSON");
    println!("    reconcile <SESSION>  Compare a session's trace against its mandate");
    println!("        --json           Emit the compliance report as JSON");
    println!();
    println!("Configuration is read from config/local.* and ROTOR__* environment");
    println!("variables.");
}
