//! Command-line interface.
//!
//! Each subcommand maps onto one client operation; list commands print the
//! picker labels of the fetched objects, one per line.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::api::{
    ApiError, CredentialStore, Credentials, KeyringStore, MemoryStore, ZentaoClient,
};
use crate::config::{self, Config, Settings};
use crate::error::{AppError, Result};
use crate::notice::{Notifier, StderrNotifier};
use crate::picker::{
    format_for_picker, PickerItem, PickerOptions, PickerSource, ResourceKind, StatusFilter,
};

/// Environment variables read by `--no-keyring`.
const ENV_URL: &str = "ZENTAO_URL";
const ENV_ACCOUNT: &str = "ZENTAO_ACCOUNT";
const ENV_PASSWORD: &str = "ZENTAO_PASSWORD";
const ENV_TOKEN: &str = "ZENTAO_TOKEN";

/// Browse ZenTao products, projects, executions, tasks, stories and bugs.
#[derive(Debug, Parser)]
#[command(name = "zentao", version, about)]
pub struct Cli {
    /// Credential profile to use (defaults to the configured profile).
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Take credentials from ZENTAO_URL / ZENTAO_ACCOUNT / ZENTAO_PASSWORD /
    /// ZENTAO_TOKEN instead of the OS keyring.
    #[arg(long, global = true)]
    pub no_keyring: bool,

    /// Write debug logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and remember the credentials.
    Login(LoginArgs),
    /// Forget the stored token.
    Logout {
        /// Also remove the stored URL, account and password.
        #[arg(long)]
        forget: bool,
    },
    /// Show the logged-in user.
    Whoami,
    /// Show the server configuration.
    ServerConfig,
    /// Show the commit-message rules.
    Rules,
    /// List products.
    Products(ListArgs),
    /// List projects, optionally of one product.
    Projects {
        #[arg(long)]
        product: Option<u64>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List executions, optionally of one project.
    Executions {
        #[arg(long)]
        project: Option<u64>,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List tasks of a project or execution.
    Tasks {
        #[command(flatten)]
        scope: TaskScope,
        #[command(flatten)]
        list: WorkItemArgs,
    },
    /// List stories of a product, project or execution.
    Stories {
        #[command(flatten)]
        scope: Scope,
        #[command(flatten)]
        list: WorkItemArgs,
    },
    /// List bugs of a product, project or execution.
    Bugs {
        #[command(flatten)]
        scope: Scope,
        #[command(flatten)]
        list: WorkItemArgs,
    },
    /// Print the configuration file path.
    ConfigPath,
    /// Make a profile the default for later commands.
    UseProfile {
        /// Profile name.
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Server URL, e.g. https://zentao.example.com/
    #[arg(long)]
    pub url: Option<String>,
    /// Login account.
    #[arg(long)]
    pub account: Option<String>,
    /// Password; prompted for when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

impl LoginArgs {
    /// Build login credentials, or `None` to reuse the stored ones.
    fn into_credentials(self) -> Result<Option<Credentials>> {
        if self.url.is_none() && self.account.is_none() && self.password.is_none() {
            return Ok(None);
        }

        let (url, account) = match (self.url, self.account) {
            (Some(url), Some(account)) => (url, account),
            _ => return Err(AppError::precondition("--url and --account are required")),
        };
        let password = match self.password {
            Some(password) => password,
            None => prompt_line("Password: ")?,
        };

        Ok(Some(Credentials::new(&url, &account, &password)))
    }
}

/// Filters applied to list output.
#[derive(Debug, Args, Default)]
pub struct ListArgs {
    /// Ids to leave out (comma separated).
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<u64>,
    /// Text placed before each label.
    #[arg(long)]
    pub prefix: Option<String>,
}

impl ListArgs {
    fn picker_options(self) -> PickerOptions {
        PickerOptions {
            exclude: self.exclude,
            prefix: self.prefix,
            ..Default::default()
        }
    }
}

/// Filters for tasks, stories and bugs, which have an assignee and a status.
#[derive(Debug, Args, Default)]
pub struct WorkItemArgs {
    #[command(flatten)]
    pub list: ListArgs,
    /// Only items assigned to me.
    #[arg(long)]
    pub mine: bool,
    /// Show closed and finished items too.
    #[arg(long)]
    pub all_statuses: bool,
}

impl WorkItemArgs {
    fn picker_options(self, kind: ResourceKind, settings: &Settings) -> PickerOptions {
        PickerOptions {
            assigned_to_me: self.mine,
            kind: Some(kind),
            status_filter: Some(if self.all_statuses {
                StatusFilter::disabled()
            } else {
                settings.status_filter
            }),
            ..self.list.picker_options()
        }
    }
}

/// Parent object of a story or bug list.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct Scope {
    #[arg(long)]
    pub product: Option<u64>,
    #[arg(long)]
    pub project: Option<u64>,
    #[arg(long)]
    pub execution: Option<u64>,
}

/// Parent object of a task list.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct TaskScope {
    #[arg(long)]
    pub project: Option<u64>,
    #[arg(long)]
    pub execution: Option<u64>,
}

/// Run the parsed command line.
pub async fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::ConfigPath = cli.command {
        println!("{}", config::config_path()?.display());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load()?;
    if let Command::UseProfile { name } = cli.command {
        config::validate_profile_name(&name)?;
        config.profile = name;
        config.save()?;
        println!("Default profile is now '{}'", config.profile);
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(profile) = cli.profile {
        config::validate_profile_name(&profile)?;
        config.profile = profile;
    }
    debug!(profile = %config.profile, no_keyring = cli.no_keyring, "Running command");

    let store: Arc<dyn CredentialStore> = if cli.no_keyring {
        Arc::new(MemoryStore::with_credentials(credentials_from_env()))
    } else {
        Arc::new(KeyringStore::new(&config.profile))
    };
    let notifier: Arc<dyn Notifier> = Arc::new(StderrNotifier);
    let options = config.settings.client_options();

    match cli.command {
        Command::Login(args) => {
            let credentials = args.into_credentials()?;
            let mut client = ZentaoClient::new(store, notifier, options)?;
            client.login(credentials).await?;
            if let Some(mode) = client.server_mode() {
                println!("Server mode: {}", mode);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout { forget } => {
            let mut client = ZentaoClient::new(store, notifier, options)?;
            if forget {
                client.forget().await?;
                println!("Logged out and removed stored credentials");
            } else {
                client.logout().await?;
                println!("Logged out");
            }
            Ok(ExitCode::SUCCESS)
        }
        command => {
            let client = ZentaoClient::connect(store, notifier, options).await?;
            if !client.is_authenticated() {
                return Err(ApiError::NotLoggedIn.into());
            }
            query(&client, command, &config.settings).await
        }
    }
}

/// Run a read-only command against a logged-in client.
async fn query(client: &ZentaoClient, command: Command, settings: &Settings) -> Result<ExitCode> {
    let user = client.user();

    let items = match command {
        Command::Whoami => {
            return Ok(match user {
                Some(user) => {
                    println!("{}", user);
                    if let Some(role) = &user.role {
                        println!("Role: {}", role);
                    }
                    println!("Server: {}", client.base_url());
                    ExitCode::SUCCESS
                }
                None => ExitCode::FAILURE,
            });
        }
        Command::ServerConfig => {
            return Ok(match &client.session().server_config {
                Some(server) => {
                    println!("Version: {}", server.version.as_deref().unwrap_or("unknown"));
                    println!("Mode: {}", server.server_mode());
                    if let Some(request_type) = &server.request_type {
                        println!("Request type: {}", request_type);
                    }
                    ExitCode::SUCCESS
                }
                None => ExitCode::FAILURE,
            });
        }
        Command::Rules => {
            return Ok(match &client.session().commit_rules {
                Some(rules) => {
                    println!("Task keyword: {}", rules.module.task);
                    println!("Bug keyword: {}", rules.module.bug);
                    println!("Story keyword: {}", rules.module.story);
                    println!("Id mark: {}", rules.id.mark);
                    println!("Id separator: {}", rules.id.split);
                    ExitCode::SUCCESS
                }
                None => ExitCode::FAILURE,
            });
        }
        Command::Products(list) => {
            let products = client.get_products().await;
            picker_lines(products, user, list.picker_options())
        }
        Command::Projects { product, list } => {
            let projects = match product {
                Some(id) => client.get_product_projects(id).await,
                None => client.get_projects().await,
            };
            picker_lines(projects, user, list.picker_options())
        }
        Command::Executions { project, list } => {
            let executions = match project {
                Some(id) => client.get_project_executions(id).await,
                None => client.get_executions().await,
            };
            picker_lines(executions, user, list.picker_options())
        }
        Command::Tasks { scope, list } => {
            let tasks = match (scope.project, scope.execution) {
                (_, Some(id)) => client.get_execution_tasks(id).await,
                (Some(id), None) => client.get_project_tasks(id).await,
                (None, None) => return Err(missing_scope()),
            };
            picker_lines(tasks, user, list.picker_options(ResourceKind::Task, settings))
        }
        Command::Stories { scope, list } => {
            let stories = match (scope.product, scope.project, scope.execution) {
                (Some(id), _, _) => client.get_product_stories(id).await,
                (None, Some(id), _) => client.get_project_stories(id).await,
                (None, None, Some(id)) => client.get_execution_stories(id).await,
                (None, None, None) => return Err(missing_scope()),
            };
            picker_lines(stories, user, list.picker_options(ResourceKind::Story, settings))
        }
        Command::Bugs { scope, list } => {
            let bugs = match (scope.product, scope.project, scope.execution) {
                (Some(id), _, _) => client.get_product_bugs(id).await,
                (None, Some(id), _) => client.get_project_bugs(id).await,
                (None, None, Some(id)) => client.get_execution_bugs(id).await,
                (None, None, None) => return Err(missing_scope()),
            };
            picker_lines(bugs, user, list.picker_options(ResourceKind::Bug, settings))
        }
        Command::Login(_)
        | Command::Logout { .. }
        | Command::ConfigPath
        | Command::UseProfile { .. } => {
            return Err(AppError::precondition("command does not query the server"))
        }
    };

    Ok(match items {
        Some(items) => {
            for item in items {
                println!("{}", item);
            }
            ExitCode::SUCCESS
        }
        None => ExitCode::FAILURE,
    })
}

fn picker_lines<T: PickerSource>(
    objects: Option<Vec<T>>,
    user: Option<&crate::api::User>,
    options: PickerOptions,
) -> Option<Vec<PickerItem>> {
    objects.map(|objects| format_for_picker(&objects, user, &options))
}

fn missing_scope() -> AppError {
    AppError::precondition("pass one of --product, --project or --execution")
}

/// Credentials from the environment, for keyring-less runs.
fn credentials_from_env() -> Credentials {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    Credentials {
        url: var(ENV_URL),
        account: var(ENV_ACCOUNT),
        password: var(ENV_PASSWORD),
        token: var(ENV_TOKEN),
    }
}

/// Read one line from stdin after printing a prompt to stderr.
fn prompt_line(prompt: &str) -> Result<String> {
    eprint!("{}", prompt);
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tasks_with_filters() {
        let cli = Cli::try_parse_from([
            "zentao", "tasks", "--execution", "4", "--mine", "--exclude", "2,5", "--prefix", "Task",
        ])
        .unwrap();

        match cli.command {
            Command::Tasks { scope, list } => {
                assert_eq!(scope.execution, Some(4));
                assert!(list.mine);
                assert_eq!(list.list.exclude, vec![2, 5]);
                assert_eq!(list.list.prefix.as_deref(), Some("Task"));
            }
            other => panic!("Expected tasks command, got {:?}", other),
        }
    }

    #[test]
    fn test_stories_scope_required() {
        assert!(Cli::try_parse_from(["zentao", "stories"]).is_err());
    }

    #[test]
    fn test_stories_scope_exclusive() {
        assert!(Cli::try_parse_from(["zentao", "stories", "--product", "1", "--project", "2"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["zentao", "products", "--profile", "work", "--no-keyring"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("work"));
        assert!(cli.no_keyring);
    }

    #[test]
    fn test_parse_logout_forget() {
        let cli = Cli::try_parse_from(["zentao", "logout", "--forget"]).unwrap();
        assert!(matches!(cli.command, Command::Logout { forget: true }));
    }

    #[test]
    fn test_login_args_empty_reuses_stored() {
        let args = LoginArgs {
            url: None,
            account: None,
            password: None,
        };
        assert!(args.into_credentials().unwrap().is_none());
    }

    #[test]
    fn test_login_args_full() {
        let args = LoginArgs {
            url: Some("https://zentao.example.com/".to_string()),
            account: Some("alice".to_string()),
            password: Some("secret".to_string()),
        };
        let creds = args.into_credentials().unwrap().unwrap();
        assert_eq!(creds.account.as_deref(), Some("alice"));
        assert_eq!(creds.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_login_args_missing_url() {
        let args = LoginArgs {
            url: None,
            account: Some("alice".to_string()),
            password: Some("secret".to_string()),
        };
        assert!(matches!(args.into_credentials(), Err(AppError::Precondition(_))));
    }

    #[test]
    fn test_login_args_password_only() {
        let args = LoginArgs {
            url: None,
            account: None,
            password: Some("secret".to_string()),
        };
        let err = args.into_credentials().unwrap_err();
        assert_eq!(err.to_string(), "--url and --account are required");
    }

    #[test]
    fn test_mine_rejected_for_unassigned_lists() {
        for command in ["products", "projects", "executions"] {
            assert!(Cli::try_parse_from(["zentao", command, "--mine"]).is_err());
            assert!(Cli::try_parse_from(["zentao", command, "--all-statuses"]).is_err());
        }
        assert!(Cli::try_parse_from(["zentao", "products", "--exclude", "1", "--prefix", "P"]).is_ok());
    }

    #[test]
    fn test_list_options_carry_exclude_and_prefix() {
        let list = WorkItemArgs {
            list: ListArgs {
                exclude: vec![3],
                prefix: Some("Bug".to_string()),
            },
            mine: true,
            all_statuses: false,
        };
        let options = list.picker_options(ResourceKind::Bug, &Settings::default());
        assert!(options.assigned_to_me);
        assert_eq!(options.kind, Some(ResourceKind::Bug));
        assert_eq!(options.exclude, vec![3]);
        assert_eq!(options.prefix.as_deref(), Some("Bug"));
    }

    #[test]
    fn test_all_statuses_disables_filter() {
        let list = WorkItemArgs {
            all_statuses: true,
            ..Default::default()
        };
        let options = list.picker_options(ResourceKind::Bug, &Settings::default());
        assert_eq!(options.status_filter, Some(StatusFilter::disabled()));

        let options = WorkItemArgs::default().picker_options(ResourceKind::Bug, &Settings::default());
        assert_eq!(options.status_filter, Some(Settings::default().status_filter));
    }

    #[test]
    #[serial]
    fn test_credentials_from_env() {
        std::env::set_var(ENV_URL, "https://zentao.example.com/");
        std::env::set_var(ENV_TOKEN, "tok");
        std::env::set_var(ENV_ACCOUNT, "");
        std::env::remove_var(ENV_PASSWORD);

        let creds = credentials_from_env();

        std::env::remove_var(ENV_URL);
        std::env::remove_var(ENV_TOKEN);
        std::env::remove_var(ENV_ACCOUNT);

        assert_eq!(creds.url.as_deref(), Some("https://zentao.example.com/"));
        assert_eq!(creds.token.as_deref(), Some("tok"));
        assert!(creds.account.is_none());
        assert!(creds.password.is_none());
    }
}
