mod commands;
mod config;
mod hosted;
mod media;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    RecipeFields, cmd_ask, cmd_chat, cmd_export, cmd_import, cmd_recipe_add, cmd_recipe_delete,
    cmd_recipe_import, cmd_recipe_list, cmd_recipe_search, cmd_recipe_show, cmd_recipe_update,
    cmd_suggest, cmd_user_add, cmd_user_delete, cmd_user_list, cmd_user_login, cmd_user_passwd,
    cmd_user_role,
};
use crate::config::{Config, Overrides};
use crate::hosted::HostedModelClient;
use larder_core::models::Session;
use larder_core::service::RecipeService;
use larder_core::store::StoreKind;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "A recipe box with an ingredient-matching assistant",
    long_about = "\n\n  ██╗      █████╗ ██████╗ ██████╗ ███████╗██████╗
  ██║     ██╔══██╗██╔══██╗██╔══██╗██╔════╝██╔══██╗
  ██║     ███████║██████╔╝██║  ██║█████╗  ██████╔╝
  ██║     ██╔══██║██╔══██╗██║  ██║██╔══╝  ██╔══██╗
  ███████╗██║  ██║██║  ██║██████╔╝███████╗██║  ██║
  ╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═════╝ ╚══════╝╚═╝  ╚═╝
        what can I cook with what I have?
"
)]
struct Cli {
    /// Recipe storage backend: sqlite or json (default: $LARDER_STORE or sqlite)
    #[arg(long, global = true, value_name = "KIND")]
    store: Option<StoreKind>,
    /// Data directory (default: $LARDER_DATA_DIR or the platform data dir)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Suggest recipes from the ingredients you have
    Suggest {
        /// Free text, e.g. "I have eggs, onion and chili"
        query: String,
        /// Maximum number of recipes to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Talk to the built-in assistant (greetings, listing, "how do I make X", suggestions)
    Chat {
        /// Your message
        query: String,
    },
    /// Ask the hosted language model about your recipes (needs HF_API_KEY)
    Ask {
        /// Your question
        query: String,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Export all recipes to a JSON file
    Export {
        /// Destination file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import recipes from a JSON file (existing recipes with the same name are replaced)
    Import {
        /// Source file (JSON array of recipes)
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Add a recipe
    Add {
        /// Recipe name
        name: String,
        /// Ingredients, one per line or comma-separated
        #[arg(short, long)]
        ingredients: String,
        /// Preparation steps
        #[arg(short, long)]
        steps: String,
        /// Image file (copied into the data directory) or URL
        #[arg(long)]
        image: Option<String>,
        /// Video file (copied into the data directory) or URL
        #[arg(long)]
        video: Option<String>,
        /// Owner (default: current user)
        #[arg(long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one recipe
    Show {
        /// Recipe name (case-insensitive)
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update fields of a recipe
    Update {
        /// Recipe name
        name: String,
        /// New name
        #[arg(long = "name", value_name = "NEW_NAME")]
        new_name: Option<String>,
        /// New ingredients
        #[arg(short, long)]
        ingredients: Option<String>,
        /// New steps
        #[arg(short, long)]
        steps: Option<String>,
        /// New image file or URL ("" to remove)
        #[arg(long)]
        image: Option<String>,
        /// New video file or URL ("" to remove)
        #[arg(long)]
        video: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find recipes by name
    Search {
        /// Part of the recipe name
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Owner (default: current user)
        #[arg(long)]
        owner: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user (prompts for the password)
    Add {
        /// Username
        username: String,
        /// Give the user admin rights
        #[arg(long)]
        admin: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a user
    Delete {
        /// Username
        username: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a user's password
    Passwd {
        /// Username
        username: String,
    },
    /// Change a user's role (admin or user)
    Role {
        /// Username
        username: String,
        /// New role
        role: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a username and password
    Login {
        /// Username
        username: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&Overrides {
        data_dir: cli.data_dir,
        store: cli.store,
    })?;
    let svc = RecipeService::open(&config.data_dir, config.store)?;
    if let Some(password) = config.admin_password.as_deref() {
        if svc.ensure_admin("admin", password)? {
            info!("created initial admin user from LARDER_ADMIN_PASSWORD");
            eprintln!("Created admin user 'admin'");
        }
    }
    let session = Session::local(&config.default_owner);

    match cli.command {
        Commands::Recipe { command } => match command {
            RecipeCommands::Add {
                name,
                ingredients,
                steps,
                image,
                video,
                owner,
                json,
            } => cmd_recipe_add(
                &svc,
                &config,
                &session,
                &name,
                RecipeFields {
                    name: None,
                    ingredients: Some(ingredients),
                    steps: Some(steps),
                    image,
                    video,
                },
                owner,
                json,
            ),
            RecipeCommands::List { json } => cmd_recipe_list(&svc, json),
            RecipeCommands::Show { name, json } => cmd_recipe_show(&svc, &name, json),
            RecipeCommands::Update {
                name,
                new_name,
                ingredients,
                steps,
                image,
                video,
                json,
            } => cmd_recipe_update(
                &svc,
                &config,
                &session,
                &name,
                RecipeFields {
                    name: new_name,
                    ingredients,
                    steps,
                    image,
                    video,
                },
                json,
            ),
            RecipeCommands::Delete { name, json } => {
                cmd_recipe_delete(&svc, &config, &session, &name, json)
            }
            RecipeCommands::Search { query, json } => cmd_recipe_search(&svc, &query, json),
            RecipeCommands::Import {
                file,
                name,
                owner,
                json,
            } => cmd_recipe_import(&svc, &session, &file, name, owner, json),
        },
        Commands::Suggest { query, limit, json } => cmd_suggest(&svc, &query, limit, json),
        Commands::Chat { query } => cmd_chat(&svc, &query),
        Commands::Ask { query } => {
            let client = HostedModelClient::new(config.hf_api_key.clone(), &config.model)?;
            cmd_ask(&svc, &client, &query).await
        }
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                admin,
                json,
            } => cmd_user_add(&svc, &session, &username, admin, json),
            UserCommands::List { json } => cmd_user_list(&svc, &session, json),
            UserCommands::Delete { username, json } => {
                cmd_user_delete(&svc, &session, &username, json)
            }
            UserCommands::Passwd { username } => cmd_user_passwd(&svc, &session, &username),
            UserCommands::Role {
                username,
                role,
                json,
            } => cmd_user_role(&svc, &session, &username, &role, json),
            UserCommands::Login { username, json } => cmd_user_login(&svc, &username, json),
        },
        Commands::Export { file, json } => cmd_export(&svc, &file, json),
        Commands::Import { file, json } => cmd_import(&svc, &file, json),
        Commands::Serve { port, bind } => {
            let client = HostedModelClient::new(config.hf_api_key.clone(), &config.model)?;
            server::start_server(svc, client, port, &bind).await
        }
    }
}
