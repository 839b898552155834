use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use renter_invite::config::AppConfig;
use renter_invite::error::AppError;
use renter_invite::portfolio::{
    AdminId, BuildingDraft, DashboardProjector, InvitationLifecycle, LogMailer,
    MemoryPortfolioStore, MemorySubmissionDirectory, OsTokenSampler, PortfolioDraft,
    ReconciliationEngine, RenterEntry, SubmissionMeta, TokenAllocator, UnitDraft,
};
use renter_invite::telemetry;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "Renter Invite",
    about = "Portfolio reconciliation and renter onboarding from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an end-to-end onboarding demo against the in-memory store
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
struct DemoArgs {
    /// Pretty-print the dashboard JSON
    #[arg(long)]
    pretty: bool,
    /// Skip the redemption portion of the demo
    #[arg(long)]
    skip_redemption: bool,
}

fn main() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(&config, args),
    }
}

fn run_demo(config: &AppConfig, args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(MemoryPortfolioStore::default());
    let submissions = Arc::new(MemorySubmissionDirectory::default());
    let mailer = Arc::new(LogMailer::new(
        config.invitations.registration_base_url.clone(),
    ));

    let engine = ReconciliationEngine::with_allocator(
        store.clone(),
        mailer,
        TokenAllocator::with_budget(OsTokenSampler, config.invitations.token_retry_budget),
    );
    let lifecycle = InvitationLifecycle::new(store.clone());
    let projector = DashboardProjector::new(store, submissions.clone());

    let admin = AdminId("demo-admin".to_string());
    let company_id = engine.reconcile(&admin, sample_portfolio())?;
    info!(company = %company_id.0, "sample portfolio reconciled");

    if !args.skip_redemption {
        let dashboard = projector.dashboard(&admin)?;
        let invitation = dashboard
            .iter()
            .flat_map(|building| building.pending.iter())
            .find(|invitation| invitation.renter_email == "jane@example.com");

        if let Some(invitation) = invitation {
            let renter_id = lifecycle.redeem(
                invitation.token.as_str(),
                "jane@example.com",
                "Jane Doe",
                "pw123456",
            )?;
            submissions.record(
                renter_id,
                SubmissionMeta {
                    filename: "move-in-checklist.pdf".to_string(),
                    size_bytes: 482_133,
                    uploaded_at: Utc::now(),
                },
            );
        }
    }

    let dashboard = projector.dashboard(&admin)?;
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&dashboard)?
    } else {
        serde_json::to_string(&dashboard)?
    };
    println!("{rendered}");

    Ok(())
}

fn sample_portfolio() -> PortfolioDraft {
    PortfolioDraft {
        company_name: "Maple Property Group".to_string(),
        contact_email: "office@maplepg.example.com".to_string(),
        buildings: vec![BuildingDraft {
            id: None,
            name: "Maple Apts".to_string(),
            postal_code: "10001".to_string(),
            units: vec![
                UnitDraft {
                    id: None,
                    unit_number: "4B".to_string(),
                    renters: vec![RenterEntry {
                        id: None,
                        full_name: "Jane Doe".to_string(),
                        email: "jane@example.com".to_string(),
                    }],
                },
                UnitDraft {
                    id: None,
                    unit_number: "5A".to_string(),
                    renters: vec![RenterEntry {
                        id: None,
                        full_name: "Marcus Webb".to_string(),
                        email: "marcus@example.com".to_string(),
                    }],
                },
            ],
        }],
    }
}
