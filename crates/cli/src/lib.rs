pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;

use commands::fields::FieldEntity;
use commands::settings::SettingsInput;

#[derive(Debug, Parser)]
#[command(
    name = "kommo-sync",
    about = "kommo-sync operator CLI",
    long_about = "Configure Kommo credentials, authorize the integration, inspect readiness, and replay order or customer syncs.",
    after_help = "Examples:\n  kommo-sync settings set --subdomain shop --client-id abc --client-secret s3cret --redirect-uri https://shop.example/cb\n  kommo-sync authorize --code def502...\n  kommo-sync doctor --json\n  kommo-sync sync-order 501"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, database schema, Kommo credentials and token readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(subcommand, about = "Show or change stored Kommo credentials")]
    Settings(SettingsCommand),
    #[command(about = "Exchange the authorization code for an access and refresh token")]
    Authorize {
        #[arg(long, help = "Authorization code to store before exchanging it")]
        code: Option<String>,
    },
    #[command(about = "Report the stored token phase without contacting Kommo")]
    Token,
    #[command(about = "List Kommo custom field definitions for an entity")]
    Fields {
        #[arg(value_enum)]
        entity: FieldEntity,
    },
    #[command(name = "sync-order", about = "Upsert the contact and create the lead for an order")]
    SyncOrder { order_id: i64 },
    #[command(name = "sync-customer", about = "Upsert the contact for a customer account")]
    SyncCustomer { customer_id: i64 },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    #[command(about = "Print stored settings with secrets redacted")]
    Show,
    #[command(about = "Store one or more credential settings")]
    Set(SetArgs),
}

#[derive(Debug, Args)]
struct SetArgs {
    #[arg(long)]
    subdomain: Option<String>,
    #[arg(long)]
    client_id: Option<String>,
    #[arg(long)]
    client_secret: Option<String>,
    #[arg(long)]
    redirect_uri: Option<String>,
    #[arg(long)]
    auth_code: Option<String>,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
        Command::Settings(SettingsCommand::Show) => commands::settings::show(),
        Command::Settings(SettingsCommand::Set(args)) => commands::settings::set(SettingsInput {
            subdomain: args.subdomain,
            client_id: args.client_id,
            client_secret: args.client_secret,
            redirect_uri: args.redirect_uri,
            auth_code: args.auth_code,
        }),
        Command::Authorize { code } => commands::authorize::run(code),
        Command::Token => commands::token::run(),
        Command::Fields { entity } => commands::fields::run(entity),
        Command::SyncOrder { order_id } => commands::sync::order(order_id),
        Command::SyncCustomer { customer_id } => commands::sync::customer(customer_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
