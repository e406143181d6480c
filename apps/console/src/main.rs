use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{
    gate, home_route, AuthClient, DriverFlow, HospitalDashboard, HttpReportStore, IdentitySource,
    MergeOutcome, Route, ServerEndpoint, SessionGate,
};
use shared::domain::{Identity, IncidentReport, ReportId, Role};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8443")]
    server_url: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates an account with the given role.
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        role: Role,
    },
    #[command(subcommand)]
    Driver(DriverCommand),
    #[command(subcommand)]
    Hospital(HospitalCommand),
}

#[derive(Subcommand, Debug)]
enum DriverCommand {
    /// Sends an incident report to a hospital.
    Submit {
        #[arg(long)]
        location: String,
        /// Hospital name or id.
        #[arg(long)]
        hospital: String,
        #[arg(long)]
        incident_type: String,
        #[arg(long)]
        consciousness: String,
        #[arg(long)]
        persons_injured: Option<String>,
    },
    /// Shows the status of the most recent report.
    Status,
}

#[derive(Subcommand, Debug)]
enum HospitalCommand {
    List,
    /// Prints the list, then every change as it arrives until interrupted.
    Watch,
    Accept { report_id: ReportId },
    Reject { report_id: ReportId },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();

    let endpoint = ServerEndpoint::parse(&args.server_url)?;
    let session_gate = SessionGate::new();
    let auth = AuthClient::new(endpoint.clone(), session_gate.clone());

    let requested = match &args.command {
        Command::Signup { username, role } => {
            let identity = auth
                .sign_up(&args.email, &args.password, username, *role)
                .await?;
            println!(
                "created {} account for {} ({})",
                identity.role.as_str(),
                identity.email,
                identity.user_id
            );
            return Ok(());
        }
        Command::Driver(_) => Route::Driver,
        Command::Hospital(_) => Route::Hospital,
    };

    let session = auth.sign_in(&args.email, &args.password).await?;
    let identity = session_gate.current_identity();
    if gate(requested, identity.as_ref()) != requested
        || home_route(identity.as_ref()) != requested
    {
        bail!(
            "{} is not allowed on the {:?} screens",
            args.email,
            requested
        );
    }
    info!(user_id = %session.identity.user_id, ?requested, "session ready");

    let store = Arc::new(HttpReportStore::new(endpoint, session.token.clone()));
    match args.command {
        Command::Signup { .. } => {}
        Command::Driver(command) => run_driver(store, session.identity, command).await?,
        Command::Hospital(command) => run_hospital(store, command).await?,
    }
    Ok(())
}

async fn run_driver(
    store: Arc<HttpReportStore>,
    identity: Identity,
    command: DriverCommand,
) -> Result<()> {
    let mut flow = DriverFlow::new(store, identity);
    match command {
        DriverCommand::Submit {
            location,
            hospital,
            incident_type,
            consciousness,
            persons_injured,
        } => {
            flow.set_location(location);
            let form = flow.form_mut();
            form.hospital = hospital;
            form.incident_type = incident_type;
            form.consciousness_state = consciousness;
            form.persons_injured = persons_injured;

            if let Err(err) = flow.submit().await {
                if let Some(banner) = flow.error() {
                    eprintln!("{banner}");
                }
                return Err(err.into());
            }
            if let Some(message) = flow.success() {
                println!("{message}");
            }
            print_status(&flow);
        }
        DriverCommand::Status => {
            flow.show_status().await?;
            print_status(&flow);
        }
    }
    Ok(())
}

fn print_status(flow: &DriverFlow<HttpReportStore>) {
    match flow.latest() {
        Some(report) => {
            println!("{}", describe(report));
            if let Some(link) = flow.navigation_link() {
                println!("Navigate to hospital: {link}");
            }
        }
        None => println!("no requests submitted yet"),
    }
}

async fn run_hospital(store: Arc<HttpReportStore>, command: HospitalCommand) -> Result<()> {
    let mut dashboard = HospitalDashboard::new(store);
    dashboard.mount().await?;

    match command {
        HospitalCommand::List => print_list(&dashboard),
        HospitalCommand::Watch => {
            print_list(&dashboard);
            loop {
                let outcome = tokio::select! {
                    outcome = dashboard.next_change() => outcome,
                    _ = tokio::signal::ctrl_c() => break,
                };
                match outcome {
                    Some(MergeOutcome::Prepended) => {
                        if let Some(report) = dashboard.reports().first() {
                            println!("new      {}", describe(report));
                        }
                    }
                    Some(MergeOutcome::Replaced(index)) => {
                        if let Some(report) = dashboard.reports().get(index) {
                            println!("updated  {}", describe(report));
                        }
                    }
                    Some(MergeOutcome::IgnoredStale) => {}
                    None => {
                        eprintln!("change feed closed");
                        break;
                    }
                }
            }
        }
        HospitalCommand::Accept { report_id } => {
            let report = dashboard.accept(report_id).await?;
            println!("{}", describe(report));
        }
        HospitalCommand::Reject { report_id } => {
            let report = dashboard.reject(report_id).await?;
            println!("{}", describe(report));
        }
    }

    dashboard.teardown();
    Ok(())
}

fn print_list(dashboard: &HospitalDashboard<HttpReportStore>) {
    if dashboard.reports().is_empty() {
        println!("no submissions");
    }
    for report in dashboard.reports() {
        println!("{}", describe(report));
    }
}

fn describe(report: &IncidentReport) -> String {
    format!(
        "[{}] {} {} at {} -> {} | {} | injured: {} | {}",
        report.status,
        report.id,
        report.incident_type,
        report.location,
        report.hospital_name,
        report.consciousness_state,
        report.persons_injured.as_deref().unwrap_or("-"),
        report.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}
