use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use shared::{directory, domain::Role};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/dispatch.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registers an account directly in the database.
    CreateAccount {
        email: String,
        username: String,
        /// `driver` or `hospital`
        role: String,
        password: String,
    },
    /// Prints every registered account, oldest first.
    ListAccounts,
    /// Prints every report, newest first.
    ListReports,
    /// Prints the locations and the hospitals serving each.
    Directory,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Directory = cli.command {
        print_directory();
        return Ok(());
    }

    let storage = Storage::new(&cli.database_url).await?;
    match cli.command {
        Command::CreateAccount {
            email,
            username,
            role,
            password,
        } => {
            let role: Role = role.parse().map_err(|err: String| anyhow!(err))?;
            shared::validation::validate_credentials(&email, &password)?;
            let account = storage
                .create_account(&email, &username, role, &password)
                .await?
                .ok_or_else(|| anyhow!("an account for {email} already exists"))?;
            println!(
                "created {} account user_id={}",
                account.role.as_str(),
                account.user_id
            );
        }
        Command::ListAccounts => {
            for account in storage.list_accounts().await? {
                println!(
                    "{}  {}  {:<8}  {} ({})",
                    account.created_at.format("%Y-%m-%d %H:%M:%S"),
                    account.user_id,
                    account.role.as_str(),
                    account.email,
                    account.username,
                );
            }
        }
        Command::ListReports => {
            for report in storage.list_reports().await? {
                println!(
                    "{}  {}  {:<8}  {} / {}  {} ({})  injured={}",
                    report.created_at.format("%Y-%m-%d %H:%M:%S"),
                    report.id,
                    report.status.to_string(),
                    report.location,
                    report.hospital_name,
                    report.incident_type,
                    report.consciousness_state,
                    report.persons_injured.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Directory => print_directory(),
    }

    Ok(())
}

fn print_directory() {
    for location in directory::LOCATIONS {
        println!("{}", location.name);
        for hospital in location.hospitals {
            println!("  {}  {}", hospital.id, hospital.name);
        }
    }
}
