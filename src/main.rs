//! QuickPoll CLI
//!
//! Command-line front end for the QuickPoll client:
//! - Browse and create polls
//! - Vote and like
//! - Watch the poll list update live
//! - Sign in and out

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quickpoll::api::{LoginCredentials, PollDetail, RegisterData};
use quickpoll::config::{generate_default_config, Config};
use quickpoll::mutation::{PollDraft, VoteOutcome};
use quickpoll::readmodel::ListState;
use quickpoll::realtime::ConnectionState;
use quickpoll::QuickPollClient;

#[derive(Parser)]
#[command(name = "quickpoll")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time polls from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API server URL (overrides config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List polls
    List {
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Show a poll with its results
    Show { id: i64 },

    /// Create a poll
    Create {
        title: String,
        /// Option text (repeat for each option)
        #[arg(short, long = "option", required = true)]
        options: Vec<String>,
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Vote on a poll
    Vote {
        id: i64,
        /// Option id or option text
        option: String,
    },

    /// Like a poll
    Like { id: i64 },

    /// Remove your like from a poll
    Unlike { id: i64 },

    /// Show the poll list and refresh it as votes and likes arrive
    Watch {
        #[arg(short, long, default_value = "1")]
        page: u32,
    },

    /// Sign in with email and password
    Login { email: String, password: String },

    /// Create an account
    Register {
        email: String,
        password: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
    },

    /// Sign in with a Google ID token
    GoogleLogin { credential: String },

    /// Sign out
    Logout,

    /// Show the signed-in viewer
    Whoami,

    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Wrote default config to {:?}", path);
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.server.api_url = url.clone();
    }
    init_logging(&config);

    // Only `watch` needs the live connection
    config.realtime.enabled = config.realtime.enabled && matches!(cli.command, Commands::Watch { .. });

    let client = QuickPollClient::new(config)?;
    client.start().await;
    let result = run(&cli, &client).await;
    client.shutdown().await;
    result
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("quickpoll={}", config.logging.level))
        });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: &Cli, client: &QuickPollClient) -> anyhow::Result<()> {
    let json = cli.format == "json";

    match &cli.command {
        Commands::List { page } => {
            let view = client.open_list(*page).await;
            let state = view.model.state();
            if let Some(error) = &state.error {
                bail!("{}", error);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&state.polls)?);
            } else {
                print_list(&state);
            }
        }

        Commands::Show { id } => {
            let detail = load_detail(client, *id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print_detail(&detail);
            }
        }

        Commands::Create {
            title,
            options,
            description,
        } => {
            let mut draft = PollDraft::new(title.as_str());
            if let Some(description) = description {
                draft = draft.description(description.as_str());
            }
            for option in options {
                draft = draft.option(option.as_str());
            }

            let detail = client
                .composer()
                .submit(&draft)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            println!("Created poll {}: {}", detail.id(), detail.poll.title);
        }

        Commands::Vote { id, option } => {
            let detail = load_detail(client, *id).await?;
            let chosen = option
                .parse::<i64>()
                .ok()
                .and_then(|option_id| detail.option(option_id))
                .or_else(|| detail.option_by_text(option))
                .ok_or_else(|| anyhow!("Poll {} has no option {:?}", id, option))?;

            let outcome = client
                .votes()
                .submit(*id, chosen.id)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            match outcome {
                VoteOutcome::Recorded(_) => println!("Voted for {:?}", chosen.option_text),
                VoteOutcome::AlreadyVoted(_) => println!("You have already voted on this poll"),
            }

            print_detail(&load_detail(client, *id).await?);
        }

        Commands::Like { id } | Commands::Unlike { id } => {
            let currently_liked = matches!(cli.command, Commands::Unlike { .. });
            let view = client.open_detail(*id).await;
            if let Some(error) = view.model.state().error {
                bail!("{}", error);
            }

            let state = client
                .likes()
                .toggle(*id, currently_liked)
                .await
                .map_err(|e| anyhow!(e.user_message()))?;
            let verb = if state.liked { "Liked" } else { "Unliked" };
            println!("{} poll {} ({} likes)", verb, id, state.count);
        }

        Commands::Watch { page } => watch(client, *page).await?,

        Commands::Login { email, password } => {
            let user = client
                .session()
                .login(&LoginCredentials {
                    email: email.clone(),
                    password: password.clone(),
                })
                .await?;
            println!("Signed in as {}", user.display_name());
        }

        Commands::Register {
            email,
            password,
            username,
            full_name,
        } => {
            let user = client
                .session()
                .register(&RegisterData {
                    email: email.clone(),
                    password: password.clone(),
                    username: username.clone(),
                    full_name: full_name.clone(),
                })
                .await?;
            println!("Registered and signed in as {}", user.display_name());
        }

        Commands::GoogleLogin { credential } => {
            let user = client.session().login_google(credential).await?;
            println!("Signed in as {}", user.display_name());
        }

        Commands::Logout => {
            client.session().logout().await;
            println!("Signed out");
        }

        Commands::Whoami => match client.session().current_user() {
            Some(user) if json => println!("{}", serde_json::to_string_pretty(&user)?),
            Some(user) => println!("{} <{}>", user.display_name(), user.email),
            None => println!("Not signed in"),
        },

        Commands::InitConfig { .. } => {}
    }

    Ok(())
}

async fn load_detail(client: &QuickPollClient, id: i64) -> anyhow::Result<PollDetail> {
    let view = client.open_detail(id).await;
    let state = view.model.state();
    match state.detail {
        Some(detail) => Ok(detail),
        None => bail!("{}", state.error.unwrap_or_else(|| format!("Poll {} not found", id))),
    }
}

async fn watch(client: &QuickPollClient, page: u32) -> anyhow::Result<()> {
    let view = client.open_list(page).await;
    let mut list = view.model.watch();
    let mut connection = client.connection().watch_state();

    print_list(&list.borrow_and_update());
    println!("Watching for updates (Ctrl+C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = list.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = list.borrow_and_update().clone();
                if !state.is_loading {
                    println!();
                    print_list(&state);
                }
            }
            changed = connection.changed() => {
                if changed.is_err() {
                    break;
                }
                match *connection.borrow_and_update() {
                    ConnectionState::Connected => println!("[live]"),
                    ConnectionState::Disconnected => println!("[offline, reconnecting]"),
                    ConnectionState::Connecting => {}
                }
            }
        }
    }

    Ok(())
}

fn print_list(state: &ListState) {
    if let Some(error) = &state.error {
        eprintln!("Error: {}", error);
    }
    if state.polls.is_empty() {
        println!("No polls yet.");
        println!();
        println!("Create the first one with:");
        println!("  quickpoll create \"Lunch?\" -o Pizza -o Sushi");
        return;
    }

    println!("{:<6} {:<40} {:>8} {:>8}", "ID", "Title", "Votes", "Likes");
    println!("{}", "-".repeat(66));
    for poll in &state.polls {
        println!(
            "{:<6} {:<40} {:>8} {:>8}",
            poll.id,
            truncate(&poll.title, 40),
            poll.total_votes,
            poll.total_likes
        );
    }
    println!();
    println!(
        "Page {} of {} ({} polls)",
        state.page,
        state.total_pages().max(1),
        state.total
    );
}

fn print_detail(detail: &PollDetail) {
    println!("{} (#{})", detail.poll.title, detail.id());
    if let Some(description) = &detail.poll.description {
        println!("{}", description);
    }
    println!();

    for (option, percent) in detail.results() {
        let bar = "#".repeat((percent / 5) as usize);
        println!(
            "  [{:>3}] {:<30} {:>5} {:>4}% {}",
            option.id,
            truncate(&option.option_text, 30),
            option.vote_count,
            percent,
            bar
        );
    }

    println!();
    println!(
        "{} votes, {} likes{}{}",
        detail.poll.total_votes,
        detail.poll.total_likes,
        if detail.user_voted { ", you voted" } else { "" },
        if detail.user_liked { ", you liked" } else { "" },
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}
