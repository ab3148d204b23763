use std::{process, sync::Arc};

use blogroll::{
    application::{
        auth::AuthService,
        error::AppError,
        feed::{FeedPageSizes, FeedService},
        follows::FollowService,
        groups::{CreateGroupCommand, GroupService},
        posts::{ImageStore, PostService},
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
            SessionsRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, FragmentCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, SiteOptions},
        telemetry,
        uploads::UploadStorage,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Users(args) => run_users(settings, args.command).await,
        config::Command::Groups(args) => run_groups(settings, args.command).await,
        config::Command::Sessions(args) => run_sessions(settings, args.command).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    let router = http::build_router(state);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;

    info!(
        target = "blogroll::serve",
        addr = %settings.server.addr,
        uploads = %settings.uploads.directory.display(),
        cache_enabled = settings.cache.enabled,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(InfraError::Serve)?;

    Ok(())
}

async fn run_users(
    settings: config::Settings,
    command: config::UsersCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let auth = build_auth_service(&repositories, &settings);

    match command {
        config::UsersCommand::Create { username, password } => {
            let user = auth.register(username.trim(), &password).await?;
            println!("created user {} (id {})", user.username, user.id);
        }
        config::UsersCommand::Delete { username } => {
            if !auth.delete_user(&username).await? {
                return Err(AppError::NotFound);
            }
            println!("deleted user {username}");
        }
    }
    Ok(())
}

async fn run_groups(
    settings: config::Settings,
    command: config::GroupsCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let groups = GroupService::new(groups_repo);

    match command {
        config::GroupsCommand::Create {
            title,
            slug,
            description,
        } => {
            let group = groups
                .create(CreateGroupCommand {
                    title,
                    slug,
                    description,
                })
                .await?;
            println!("created group {} ({})", group.title, group.slug);
        }
        config::GroupsCommand::Delete { slug } => {
            groups.delete(&slug).await?;
            println!("deleted group {slug}");
        }
        config::GroupsCommand::List => {
            for group in groups.list().await? {
                println!("{}\t{}", group.slug, group.title);
            }
        }
    }
    Ok(())
}

async fn run_sessions(
    settings: config::Settings,
    command: config::SessionsCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let auth = build_auth_service(&repositories, &settings);

    match command {
        config::SessionsCommand::Purge => {
            let purged = auth.purge_expired_sessions().await?;
            println!("purged {purged} expired sessions");
        }
    }
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::Connect)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::Migrate)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_auth_service(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> AuthService {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    let ttl = time::Duration::try_from(settings.session.ttl).unwrap_or(time::Duration::DAY);
    AuthService::new(users_repo, sessions_repo, ttl)
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let uploads = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone()).map_err(|source| {
            InfraError::Uploads {
                path: settings.uploads.directory.clone(),
                source,
            }
        })?,
    );
    let images: Arc<dyn ImageStore> = uploads.clone();

    let feed = FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        follows_repo.clone(),
        comments_repo.clone(),
        FeedPageSizes {
            feed: settings.feed.page_size.get(),
            profile: settings.feed.profile_page_size.get(),
        },
    );
    let posts = PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo,
        comments_repo,
        images,
    );
    let follows = FollowService::new(users_repo, follows_repo);
    let auth = build_auth_service(&repositories, settings);
    let cache = FragmentCache::new(CacheConfig::from(&settings.cache));

    let max_request_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes does not fit in memory"))?;

    Ok(HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(posts),
        follows: Arc::new(follows),
        auth: Arc::new(auth),
        cache: Arc::new(cache),
        uploads,
        health: health_repo,
        site: SiteOptions {
            timezone: settings.feed.timezone,
            session_cookie: settings.session.cookie_name.clone(),
            secure_cookie: settings.session.secure_cookie,
            max_request_bytes,
        },
    })
}
