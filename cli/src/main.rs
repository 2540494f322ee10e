use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use finboard::config::ConfigError;
use finboard::hooks::{
    AnalyticsHook, BudgetsHook, CategoriesHook, ExpensesHook, HookStatus, NotificationsHook, RemindersHook, ReportsHook,
    SharedExpensesHook, SubscriptionsHook,
};
use finboard::net::TransportError;
use finboard::net::types::{
    BillingInterval, BudgetRequest, CreateSubscriptionRequest, ExpenseParams, ExpenseRequest, GroupExpenseRequest,
    GroupRequest, Item, LoginRequest, RegisterRequest, UpdateReminderRequest, UpdateSubscriptionRequest,
};
use finboard::services::AuthError;
use finboard::session::FileStore;
use finboard::toast::{ToastQueue, ToastVariant};
use finboard::{ApiError, AppState, ClientConfig, Navigator};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not build HTTP client: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("not signed in; run `finboard login` first")]
    SignedOut,
    #[error("{0}")]
    Failed(String),
    #[error("could not render output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "finboard", about = "Personal finance dashboard client")]
struct Cli {
    /// Session file holding tokens and the signed-in user.
    #[arg(long, global = true, env = "FINBOARD_STORE", default_value = ".finboard-session.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        username: String,
        #[arg(long, env = "FINBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        username: String,
        email: String,
        #[arg(long, env = "FINBOARD_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    Logout,
    Whoami,
    #[command(subcommand)]
    Expenses(ExpenseCommand),
    #[command(subcommand)]
    Reports(ReportCommand),
    #[command(subcommand)]
    Categories(CategoryCommand),
    #[command(subcommand)]
    Budgets(BudgetCommand),
    #[command(subcommand)]
    Subscriptions(SubscriptionCommand),
    #[command(subcommand)]
    Reminders(ReminderCommand),
    #[command(subcommand)]
    Notifications(NotificationCommand),
    #[command(subcommand)]
    Groups(GroupCommand),
    #[command(subcommand)]
    Analytics(AnalyticsCommand),
}

#[derive(Subcommand, Debug)]
enum ExpenseCommand {
    List {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Create {
        #[arg(long)]
        description: Option<String>,
        /// `name:price:quantity`, repeatable.
        #[arg(long = "item", value_parser = parse_item, required = true)]
        items: Vec<Item>,
    },
    Delete {
        expense_id: String,
    },
    DeleteAll,
    Describe {
        expense_id: String,
        description: String,
    },
    UpdateItem {
        expense_id: String,
        item_id: String,
        /// `name:price:quantity`.
        #[arg(value_parser = parse_item)]
        item: Item,
    },
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    List,
    Show {
        report_id: String,
    },
    Create {
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
    },
    Delete {
        report_id: String,
    },
    DeleteAll,
}

#[derive(Subcommand, Debug)]
enum CategoryCommand {
    List,
    Create { name: String },
    Rename { category_id: String, name: String },
    Delete { category_id: String },
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    List {
        /// `YYYY-MM`.
        #[arg(long)]
        month: Option<String>,
    },
    Upsert {
        month: String,
        category_id: String,
        limit: f64,
    },
    Update {
        budget_id: String,
        month: String,
        category_id: String,
        limit: f64,
    },
    Delete {
        budget_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SubscriptionCommand {
    List,
    Create {
        name: String,
        amount: f64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value = "monthly")]
        interval: BillingInterval,
        /// `YYYY-MM-DD`.
        #[arg(long)]
        start_date: String,
        #[arg(long, default_value_t = 3)]
        notify_days: u32,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long)]
        interval: Option<BillingInterval>,
        #[arg(long)]
        start_date: Option<String>,
        #[arg(long)]
        notify_days: Option<u32>,
        #[arg(long)]
        active: Option<bool>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ReminderCommand {
    List,
    Create {
        message: String,
        /// RFC 3339 timestamp, or `YYYY-MM-DDTHH:MM:SS` read as UTC.
        remind_at: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        remind_at: Option<String>,
        #[arg(long)]
        processed: Option<bool>,
    },
    Delete {
        id: i64,
    },
    ProcessDue,
}

#[derive(Subcommand, Debug)]
enum NotificationCommand {
    List,
    Read { id: i64 },
    Delete { id: i64 },
    DeleteAll,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    List,
    Show {
        group_id: String,
    },
    Create {
        title: String,
        /// Extra member user ids; the signed-in user is always included.
        #[arg(long = "member")]
        members: Vec<String>,
    },
    Rename {
        group_id: String,
        title: String,
    },
    Delete {
        group_id: String,
    },
    AddMember {
        group_id: String,
        user_id: String,
    },
    Expenses {
        group_id: String,
    },
    AddExpense {
        group_id: String,
        description: String,
        /// `user_id=amount`, repeatable.
        #[arg(long = "pay", value_parser = parse_payment, required = true)]
        payments: Vec<(String, f64)>,
    },
    DeleteExpense {
        group_id: String,
        expense_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum AnalyticsCommand {
    Monthly { month: String },
    Weekly,
    RecomputeMonthly { month: String },
    RecomputeWeekly,
    DeleteMonthly { month: String },
    DeleteWeekly,
}

/// Prints a sign-in hint when the session cannot be renewed.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn redirect_to_login(&self) {
        eprintln!("session expired; run `finboard login` to sign in again");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {e}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut toasts = ToastQueue::new();
    let code = match run(cli, &mut toasts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            toasts.show(e.to_string(), ToastVariant::Error);
            ExitCode::FAILURE
        }
    };
    for toast in toasts.visible(Instant::now()) {
        eprintln!("[{}] {}", toast.variant, toast.message);
    }
    code
}

async fn run(cli: Cli, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let store = Arc::new(FileStore::new(cli.store));
    let state = AppState::from_config(&config, store, Arc::new(CliNavigator))?;
    let phase = state.session.restore().await;
    tracing::debug!(?phase, "session restored");

    match cli.command {
        Command::Login { username, password } => {
            let user = state.session.login(&LoginRequest { username, password }).await?;
            toasts.show(format!("signed in as {}", user.display_name()), ToastVariant::Success);
            print_json(&user)
        }
        Command::Register { username, email, password, first_name, last_name } => {
            let profile = RegisterRequest { username, email, password, first_name, last_name };
            let user = state.session.register(&profile).await?;
            toasts.show(format!("welcome, {}", user.display_name()), ToastVariant::Success);
            print_json(&user)
        }
        Command::Logout => {
            state.session.logout();
            toasts.show("signed out", ToastVariant::Info);
            Ok(())
        }
        Command::Whoami => print_json(&state.session.current_user().ok_or(CliError::SignedOut)?),
        command => {
            let user_id = state.session.user_id().ok_or(CliError::SignedOut)?;
            run_resource(&state, &user_id, command, toasts).await
        }
    }
}

async fn run_resource(state: &AppState, user_id: &str, command: Command, toasts: &mut ToastQueue) -> Result<(), CliError> {
    match command {
        Command::Expenses(command) => run_expenses(state, command, toasts).await,
        Command::Reports(command) => run_reports(state, command, toasts).await,
        Command::Categories(command) => run_categories(state, command, toasts).await,
        Command::Budgets(command) => run_budgets(state, command, toasts).await,
        Command::Subscriptions(command) => run_subscriptions(state, user_id, command, toasts).await,
        Command::Reminders(command) => run_reminders(state, command, toasts).await,
        Command::Notifications(command) => run_notifications(state, command, toasts).await,
        Command::Groups(command) => run_groups(state, user_id, command, toasts).await,
        Command::Analytics(command) => run_analytics(state, command, toasts).await,
        Command::Login { .. } | Command::Register { .. } | Command::Logout | Command::Whoami => Ok(()),
    }
}

// =============================================================================
// RESOURCES
// =============================================================================

async fn run_expenses(state: &AppState, command: ExpenseCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = ExpensesHook::new(state);
    match command {
        ExpenseCommand::List { from, to } => {
            hook.fetch(ExpenseParams { date_from: from, date_to: to }).await;
            settled(hook.status())?;
        }
        ExpenseCommand::Create { description, items } => {
            if let Some(created) = hook.create(&ExpenseRequest { description, items }).await? {
                toasts.show(format!("created expense {}", created.expense_id), ToastVariant::Success);
            }
        }
        ExpenseCommand::Delete { expense_id } => {
            hook.delete(&expense_id).await?;
            toasts.show("expense deleted", ToastVariant::Success);
        }
        ExpenseCommand::DeleteAll => {
            hook.delete_all().await?;
            toasts.show("all expenses deleted", ToastVariant::Success);
        }
        ExpenseCommand::Describe { expense_id, description } => {
            hook.update_description(&expense_id, &description).await?;
            toasts.show("description updated", ToastVariant::Success);
        }
        ExpenseCommand::UpdateItem { expense_id, item_id, item } => {
            hook.update_item(&expense_id, &item_id, &item).await?;
            toasts.show("item updated", ToastVariant::Success);
        }
    }
    print_json(hook.expenses())
}

async fn run_reports(state: &AppState, command: ReportCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = ReportsHook::new(state);
    match command {
        ReportCommand::List => {
            hook.fetch_ids().await;
            settled(hook.status())?;
        }
        ReportCommand::Show { report_id } => {
            if let Some(report) = hook.fetch(&report_id).await? {
                return print_json(&report);
            }
        }
        ReportCommand::Create { from, to } => {
            if let Some(created) = hook.create(&ExpenseParams { date_from: from, date_to: to }).await? {
                toasts.show(format!("created report {}", created.report_id), ToastVariant::Success);
            }
        }
        ReportCommand::Delete { report_id } => {
            hook.delete(&report_id).await?;
            toasts.show("report deleted", ToastVariant::Success);
        }
        ReportCommand::DeleteAll => {
            hook.delete_all().await?;
            toasts.show("all reports deleted", ToastVariant::Success);
        }
    }
    print_json(hook.report_ids())
}

async fn run_categories(state: &AppState, command: CategoryCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = CategoriesHook::new(state);
    match command {
        CategoryCommand::List => {
            hook.fetch().await;
            settled(hook.status())?;
        }
        CategoryCommand::Create { name } => {
            if let Some(created) = hook.create(&name).await? {
                toasts.show(format!("created category {}", created.category_id), ToastVariant::Success);
            }
        }
        CategoryCommand::Rename { category_id, name } => {
            hook.update(&category_id, &name).await?;
            toasts.show("category renamed", ToastVariant::Success);
        }
        CategoryCommand::Delete { category_id } => {
            hook.delete(&category_id).await?;
            toasts.show("category deleted", ToastVariant::Success);
        }
    }
    print_json(hook.categories())
}

async fn run_budgets(state: &AppState, command: BudgetCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = BudgetsHook::new(state);
    match command {
        BudgetCommand::List { month } => {
            hook.fetch(month.as_deref()).await;
            settled(hook.status())?;
        }
        BudgetCommand::Upsert { month, category_id, limit } => {
            hook.upsert(&BudgetRequest { month, category_id, limit }).await?;
            toasts.show("budget saved", ToastVariant::Success);
        }
        BudgetCommand::Update { budget_id, month, category_id, limit } => {
            hook.update(&budget_id, &BudgetRequest { month, category_id, limit }).await?;
            toasts.show("budget updated", ToastVariant::Success);
        }
        BudgetCommand::Delete { budget_id } => {
            hook.delete(&budget_id).await?;
            toasts.show("budget deleted", ToastVariant::Success);
        }
    }
    print_json(hook.budgets())
}

async fn run_subscriptions(
    state: &AppState,
    user_id: &str,
    command: SubscriptionCommand,
    toasts: &mut ToastQueue,
) -> Result<(), CliError> {
    let mut hook = SubscriptionsHook::new(state);
    match command {
        SubscriptionCommand::List => {
            hook.fetch().await;
            settled(hook.status())?;
        }
        SubscriptionCommand::Create { name, amount, currency, interval, start_date, notify_days } => {
            let request = CreateSubscriptionRequest {
                user_id: user_id.to_owned(),
                name,
                amount,
                currency,
                interval,
                start_date,
                notification_offset_days: notify_days,
            };
            if let Some(created) = hook.create(&request).await? {
                toasts.show(format!("subscribed to {}", created.name), ToastVariant::Success);
            }
        }
        SubscriptionCommand::Update { id, name, amount, currency, interval, start_date, notify_days, active } => {
            let request = UpdateSubscriptionRequest {
                name,
                amount,
                currency,
                interval,
                start_date,
                notification_offset_days: notify_days,
                is_active: active,
            };
            hook.update(&id, &request).await?;
            toasts.show("subscription updated", ToastVariant::Success);
        }
        SubscriptionCommand::Delete { id } => {
            hook.delete(&id).await?;
            toasts.show("subscription deleted", ToastVariant::Success);
        }
    }
    print_json(hook.subscriptions())
}

async fn run_reminders(state: &AppState, command: ReminderCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = RemindersHook::new(state);
    match command {
        ReminderCommand::List => {
            hook.fetch().await;
            settled(hook.status())?;
        }
        ReminderCommand::Create { message, remind_at } => {
            if let Some(created) = hook.create(&message, &remind_at).await? {
                toasts.show(format!("reminder {} scheduled", created.id), ToastVariant::Success);
            }
        }
        ReminderCommand::Update { id, message, remind_at, processed } => {
            hook.update(id, &UpdateReminderRequest { message, remind_at, processed }).await?;
            toasts.show("reminder updated", ToastVariant::Success);
        }
        ReminderCommand::Delete { id } => {
            hook.delete(id).await?;
            toasts.show("reminder deleted", ToastVariant::Success);
        }
        ReminderCommand::ProcessDue => {
            hook.process_due().await?;
            toasts.show("due reminders processed", ToastVariant::Success);
        }
    }
    print_json(hook.reminders())
}

async fn run_notifications(
    state: &AppState,
    command: NotificationCommand,
    toasts: &mut ToastQueue,
) -> Result<(), CliError> {
    let mut hook = NotificationsHook::new(state);
    match command {
        NotificationCommand::List => {
            hook.fetch().await;
            settled(hook.status())?;
        }
        NotificationCommand::Read { id } => {
            hook.mark_as_read(id).await?;
        }
        NotificationCommand::Delete { id } => {
            hook.delete(id).await?;
            toasts.show("notification deleted", ToastVariant::Success);
        }
        NotificationCommand::DeleteAll => {
            hook.delete_all().await?;
            toasts.show("all notifications deleted", ToastVariant::Success);
        }
    }
    toasts.show(format!("{} unread", hook.unread_count()), ToastVariant::Info);
    print_json(hook.notifications())
}

async fn run_groups(
    state: &AppState,
    user_id: &str,
    command: GroupCommand,
    toasts: &mut ToastQueue,
) -> Result<(), CliError> {
    let mut hook = SharedExpensesHook::new(state);
    match command {
        GroupCommand::List => {
            hook.fetch_user_groups().await;
            settled(hook.status())?;
            print_json(hook.groups())
        }
        GroupCommand::Show { group_id } => {
            hook.fetch_group(&group_id).await;
            settled(hook.status())?;
            print_json(&hook.selected())
        }
        GroupCommand::Create { title, mut members } => {
            if !members.iter().any(|m| m == user_id) {
                members.insert(0, user_id.to_owned());
            }
            hook.create_group(&GroupRequest { group_title: title, group_members: members }).await?;
            toasts.show("group created", ToastVariant::Success);
            print_json(hook.groups())
        }
        GroupCommand::Rename { group_id, title } => {
            hook.update_group_title(&group_id, &title).await?;
            toasts.show("group renamed", ToastVariant::Success);
            print_json(&hook.selected())
        }
        GroupCommand::Delete { group_id } => {
            hook.delete_group(&group_id).await?;
            toasts.show("group deleted", ToastVariant::Success);
            print_json(hook.groups())
        }
        GroupCommand::AddMember { group_id, user_id: member } => {
            hook.add_member(&group_id, &member).await?;
            toasts.show(format!("added {member}"), ToastVariant::Success);
            print_json(hook.members())
        }
        GroupCommand::Expenses { group_id } => {
            hook.fetch_group_expenses(&group_id).await;
            settled(hook.status())?;
            print_json(hook.expenses())
        }
        GroupCommand::AddExpense { group_id, description, payments } => {
            let payments: BTreeMap<String, f64> = payments.into_iter().collect();
            hook.add_group_expense(&group_id, &GroupExpenseRequest { description, payments }).await?;
            toasts.show("shared expense added", ToastVariant::Success);
            print_json(hook.expenses())
        }
        GroupCommand::DeleteExpense { group_id, expense_id } => {
            hook.delete_group_expense(&group_id, &expense_id).await?;
            toasts.show("shared expense deleted", ToastVariant::Success);
            print_json(hook.expenses())
        }
    }
}

async fn run_analytics(state: &AppState, command: AnalyticsCommand, toasts: &mut ToastQueue) -> Result<(), CliError> {
    let mut hook = AnalyticsHook::new(state);
    match command {
        AnalyticsCommand::Monthly { month } => {
            hook.fetch_monthly(&month).await;
            settled(hook.status())?;
            print_json(&hook.monthly())
        }
        AnalyticsCommand::Weekly => {
            hook.fetch_weekly().await;
            settled(hook.status())?;
            print_json(&hook.weekly())
        }
        AnalyticsCommand::RecomputeMonthly { month } => {
            hook.recompute_monthly(&month).await?;
            toasts.show("monthly analytics recomputed", ToastVariant::Success);
            print_json(&hook.monthly())
        }
        AnalyticsCommand::RecomputeWeekly => {
            hook.recompute_weekly().await?;
            toasts.show("weekly analytics recomputed", ToastVariant::Success);
            print_json(&hook.weekly())
        }
        AnalyticsCommand::DeleteMonthly { month } => {
            hook.delete_monthly(&month).await?;
            toasts.show("monthly analytics deleted", ToastVariant::Success);
            Ok(())
        }
        AnalyticsCommand::DeleteWeekly => {
            hook.delete_weekly().await?;
            toasts.show("weekly analytics deleted", ToastVariant::Success);
            Ok(())
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Fetches keep their error in the hook status; surface it.
fn settled(status: &HookStatus) -> Result<(), CliError> {
    match &status.error {
        Some(message) => Err(CliError::Failed(message.clone())),
        None => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_item(raw: &str) -> Result<Item, String> {
    let mut parts = raw.rsplitn(3, ':');
    let (Some(quantity), Some(price), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected name:price:quantity, got {raw:?}"));
    };
    let item_price = price.trim().parse::<f64>().map_err(|e| format!("bad price {price:?}: {e}"))?;
    let item_quantity = quantity.trim().parse::<u32>().map_err(|e| format!("bad quantity {quantity:?}: {e}"))?;
    Ok(Item { item_id: String::new(), item_name: name.trim().to_owned(), item_price, item_quantity })
}

fn parse_payment(raw: &str) -> Result<(String, f64), String> {
    let (user, amount) = raw.split_once('=').ok_or_else(|| format!("expected user=amount, got {raw:?}"))?;
    let amount = amount.trim().parse::<f64>().map_err(|e| format!("bad amount {amount:?}: {e}"))?;
    Ok((user.trim().to_owned(), amount))
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
