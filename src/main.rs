use std::io::{Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use game_uploader::api::{ApiClient, FileCredentialStore, StaticCredentials};
use game_uploader::config::{Config, DEFAULT_CONFIG_FILE, ENV_API_BASE_URL, ENV_TOKEN};
use game_uploader::core::{GameQuery, Role, UserQuery};
use game_uploader::utils::format_bytes;
use game_uploader::{
    Category,
    CredentialStore,
    GameId,
    GameMetadata,
    Navigator,
    PresignedUploader,
    UploadWorkflow,
    WorkflowEvent,
};

#[derive(Parser)]
#[command(name = "game-uploader")]
#[command(about = "Publish game packages to the game hosting backend")]
struct Cli {
    /// 配置文件
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// 后端地址，覆盖配置文件
    #[arg(long, env = ENV_API_BASE_URL)]
    api_url: Option<String>,

    /// bearer token，覆盖配置文件
    #[arg(long, env = ENV_TOKEN, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 创建新游戏并上传 ZIP
    Upload {
        #[command(flatten)]
        metadata: MetadataArgs,

        /// 游戏 ZIP 包
        file: PathBuf,
    },
    /// 更新已有游戏；不指定文件时重新处理已上传的包
    Reupload {
        game_id: u64,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    #[command(subcommand)]
    Games(GamesCommand),
    #[command(subcommand)]
    Users(UsersCommand),
}

#[derive(Args)]
struct MetadataArgs {
    #[arg(short, long)]
    name: String,

    #[arg(short, long, default_value = "")]
    description: String,

    #[arg(long)]
    category: Option<Category>,

    /// 可重复
    #[arg(short, long = "tag")]
    tags: Vec<String>,
}

impl MetadataArgs {
    fn into_metadata(self) -> GameMetadata {
        GameMetadata {
            name: self.name,
            description: self.description,
            category: self.category,
            tags: self.tags.into_iter().collect(),
        }
    }
}

#[derive(Subcommand)]
enum GamesCommand {
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(short, long)]
        search: Option<String>,
    },
    Status {
        game_id: u64,
    },
    Delete {
        game_id: u64,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        active: Option<bool>,
    },
    Show {
        user_id: u64,
    },
    Delete {
        user_id: u64,
    },
}

/// 终端里没有页面可跳，只提示操作者
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, path: &str, _state: Option<serde_json::Value>) {
        match path {
            game_uploader::api::LOGIN_PATH => warn!("login required, update the token and retry"),
            game_uploader::api::UNAUTHORIZED_PATH => warn!("this account is not allowed to do that"),
            other => info!(path = other, "navigate"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(api_url) = cli.api_url {
        config.api_base_url = api_url;
    }
    if let Some(token) = cli.token {
        config.token = Some(token);
    }

    let credentials = open_credentials(&config)?;
    let api = Arc::new(
        ApiClient::from_config(&config, credentials, Arc::new(ConsoleNavigator))
            .context("creating api client")?,
    );

    match cli.command {
        Command::Upload { metadata, file } => {
            let transport = Arc::new(PresignedUploader::from_config(&config.upload)?);
            let handle = UploadWorkflow::new(api, transport, config.upload.clone());
            let result = publish(&handle.workflow, Some(metadata.into_metadata()), Some(file)).await;
            handle.shutdown().await?;
            println!("Published: {}", result?);
        }
        Command::Reupload { game_id, file } => {
            let game_id = GameId(game_id);
            let game = api
                .find_game(game_id)
                .await?
                .with_context(|| format!("game {game_id} not found"))?;

            let transport = Arc::new(PresignedUploader::from_config(&config.upload)?);
            let handle = UploadWorkflow::edit(api, transport, config.upload.clone(), game_id, game.metadata());
            let result = publish(&handle.workflow, None, file).await;
            handle.shutdown().await?;
            println!("Published: {}", result?);
        }
        Command::Games(command) => run_games(&api, command).await?,
        Command::Users(command) => run_users(&api, command).await?,
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_credentials(config: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    if let Some(token) = &config.token {
        return Ok(Arc::new(StaticCredentials::new(token.clone())));
    }
    match &config.credentials_file {
        Some(path) => {
            let store = FileCredentialStore::open(path)
                .with_context(|| format!("reading credentials from {}", path.display()))?;
            if store.role().is_some_and(|role| role != Role::Admin) {
                warn!("stored credentials are not an admin account");
            }
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(StaticCredentials::empty())),
    }
}

/// 驱动一次完整的上传流程，返回游戏地址
async fn publish(
    workflow: &UploadWorkflow,
    metadata: Option<GameMetadata>,
    file: Option<PathBuf>,
) -> anyhow::Result<String> {
    let mut events = workflow.subscribe();

    let snapshot = workflow.snapshot().await?;
    let metadata = metadata.unwrap_or_else(|| snapshot.metadata().clone());
    let game_id = workflow.submit_metadata(metadata).await?;
    info!(%game_id, "metadata saved");

    match file {
        Some(file) => workflow.begin_upload(file).await?,
        None => {
            let asset = match workflow.snapshot().await?.existing_asset().cloned() {
                Some(asset) => asset,
                None => workflow
                    .check_existing_asset()
                    .await?
                    .context("no file given and the game has no uploaded package")?,
            };
            info!(file = %asset.file_name, size = %format_bytes(asset.file_size), "reprocessing existing package");
            workflow.process_existing_asset().await?;
        }
    }

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                if let Err(err) = workflow.cancel_upload().await {
                    warn!("nothing to cancel: {}", err);
                }
                continue;
            }
        };

        match event {
            Ok(WorkflowEvent::Progress { percent, .. }) => render_progress(percent)?,
            Ok(WorkflowEvent::StatusUpdated { status, .. }) => info!(%status, "processing"),
            Ok(WorkflowEvent::Completed { url, .. }) => return Ok(url),
            Ok(WorkflowEvent::Failed { message, .. }) => bail!(message),
            Ok(WorkflowEvent::StepChanged { to, .. }) => info!(step = %to, "step"),
            Ok(WorkflowEvent::ExistingAssetFound { .. }) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event receiver lagged"),
            Err(RecvError::Closed) => bail!("workflow stopped unexpectedly"),
        }
    }
}

fn render_progress(percent: u8) -> anyhow::Result<()> {
    let mut out = stdout();
    execute!(
        out,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(format!("Uploading... {percent}%")),
    )?;
    if percent >= 100 {
        writeln!(out)?;
    }
    Ok(())
}

async fn run_games(api: &ApiClient, command: GamesCommand) -> anyhow::Result<()> {
    match command {
        GamesCommand::List { page, size, search } => {
            let result = api.list_games(&GameQuery { page, size, search }).await?;
            for game in &result.content {
                println!(
                    "{:>6}  {:<32} {:<10} {:<10} plays={}",
                    game.id.0,
                    game.name,
                    game.status.as_str(),
                    game.category.map(|category| category.as_str()).unwrap_or("-"),
                    game.play_count
                );
            }
            println!("page {}/{} ({} games)", result.number + 1, result.total_pages.max(1), result.total_elements);
        }
        GamesCommand::Status { game_id } => {
            let status = game_uploader::GameRegistry::game_status(api, GameId(game_id)).await?;
            println!("{}", status.game_status);
            if let Some(url) = status.game_url {
                println!("url: {url}");
            }
            if let Some(message) = status.error_message {
                println!("error: {message}");
            }
        }
        GamesCommand::Delete { game_id } => {
            api.delete_game(GameId(game_id)).await?;
            println!("Deleted game {game_id}");
        }
    }
    Ok(())
}

async fn run_users(api: &ApiClient, command: UsersCommand) -> anyhow::Result<()> {
    match command {
        UsersCommand::List { page, size, search, role, active } => {
            let result = api.list_users(&UserQuery { page, size, search, role, active }).await?;
            for user in &result.content {
                println!(
                    "{:>6}  {:<24} {:<32} {:<10} {}",
                    user.id,
                    user.username,
                    user.email,
                    user.role.as_str(),
                    if user.active { "active" } else { "inactive" }
                );
            }
            println!("page {}/{} ({} users)", result.number + 1, result.total_pages.max(1), result.total_elements);
        }
        UsersCommand::Show { user_id } => {
            let user = api.get_user(user_id).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UsersCommand::Delete { user_id } => {
            api.delete_user(user_id).await?;
            println!("Deleted user {user_id}");
        }
    }
    Ok(())
}
