use anyhow::Context;
use clap::Parser;
use survey_etl::config::cli::{Cli, Command, LoginArgs};
use survey_etl::domain::ports::{CredentialStore, SurveySource};
use survey_etl::utils::{logger, validation::Validate};
use survey_etl::{
    AddUserOutcome, AppConfig, JsonCredentialStore, LocalStorage, PavloviaGateway, SurveyDownloader,
    SurveyError,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    if let Err(e) = run(cli).await {
        tracing::error!("❌ {:#}", e);
        eprintln!("❌ {:#}", e);
        if let Some(survey_error) = e.downcast_ref::<SurveyError>() {
            eprintln!("💡 {}", survey_error.recovery_suggestion());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.load_config().context("Failed to load configuration")?;
    config.validate()?;

    let cache_dir = config
        .cache
        .dir
        .clone()
        .context("No credential cache directory configured")?;
    let store = JsonCredentialStore::open(&cache_dir)
        .with_context(|| format!("Cannot open credential cache at {}", cache_dir.display()))?;

    match cli.command {
        Command::ListUsers => print_items(store.list_users()?),

        Command::AddUser { login, force } => {
            if !force && store.list_users()?.contains(&login.username) {
                println!("User already exists. Use update-user to update the user.");
                println!("Operation cancelled.");
                return Ok(());
            }
            let token = request_token(&config, &login).await?;
            match store.add_user(&login.username, &token, force)? {
                AddUserOutcome::Added => println!("--Added user: {}", login.username),
                AddUserOutcome::Updated => println!("--Updated user: {}", login.username),
                AddUserOutcome::AlreadyExists => println!("User already exists."),
            }
        }

        Command::UpdateUser { login } => {
            if !store.list_users()?.contains(&login.username) {
                println!("User does not exist.");
                return Ok(());
            }
            let token = request_token(&config, &login).await?;
            store.add_user(&login.username, &token, true)?;
            println!("--Updated user: {}", login.username);
        }

        Command::RemoveUser { user } => {
            if store.remove_user(&user)? {
                println!("--Removed user: {}", user);
            } else {
                println!("User {} not found.", user);
            }
        }

        Command::RemoveAllUsers => {
            store.purge()?;
            println!("--Removed all users");
        }

        Command::ListSurveys {
            user,
            access_rights,
        } => {
            let token = store.load_token(&user)?;
            let gateway = PavloviaGateway::new(config.api.clone())?;
            let surveys = gateway.list_available(&token, access_rights).await?;
            print_items(surveys.iter().map(|(id, name)| format!("{} - {}", id, name)));
        }

        Command::GetSurveys { user, surveys, .. } => {
            let token = store.load_token(&user)?;
            let gateway = PavloviaGateway::new(config.api.clone())?;
            let storage = LocalStorage::new(&config.export.output_root);

            tracing::info!("📁 Saving surveys under {}", storage.base_path().display());
            let downloader = SurveyDownloader::new(gateway, storage, config.export.clone());
            let report = downloader.download_surveys(&token, surveys.as_deref()).await?;

            print!("{}", report);
            println!(
                "✅ {} survey(s) exported, {} skipped, {} warning(s)",
                report.exported.len(),
                report.skipped.len(),
                report.warnings.len()
            );
        }
    }

    Ok(())
}

async fn request_token(config: &AppConfig, login: &LoginArgs) -> anyhow::Result<String> {
    let gateway = PavloviaGateway::new(config.api.clone())?;
    let token = gateway
        .request_access_token(&login.username, &login.password)
        .await?;
    Ok(token)
}

fn print_items<I, T>(items: I)
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    for item in items {
        println!("* {}", item);
    }
}
