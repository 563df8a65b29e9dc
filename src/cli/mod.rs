use std::fs::File;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use crate::application::ShopService;
use crate::domain::{format_cents, parse_cents};
use crate::io::Exporter;

/// Coinshop - internal currency ledger
#[derive(Parser)]
#[command(name = "coinshop")]
#[command(about = "Buy catalog items and send coins between accounts")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "COINSHOP_DATABASE", default_value = "coinshop.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Catalog management commands
    #[command(subcommand)]
    Item(ItemCommands),

    /// Buy a catalog item
    Buy {
        /// Buyer username
        username: String,

        /// Item name
        item: String,
    },

    /// Send coins to another account
    Send {
        /// Amount to send (e.g., "30" or "30.50")
        amount: String,

        /// Sender username
        #[arg(long)]
        from: String,

        /// Receiver username
        #[arg(long)]
        to: String,
    },

    /// List purchases and transfers of an account
    History {
        /// Username
        username: String,
    },

    /// Export an account's records to CSV or JSON
    Export {
        /// What to export: purchases, transfers, history
        export_type: String,

        /// Username
        #[arg(short, long)]
        user: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Create {
        /// Username (must be unique)
        username: String,

        /// Starting balance (defaults to 1000)
        #[arg(short, long)]
        balance: Option<String>,
    },

    /// List all accounts with balances
    List,

    /// Show balance, inventory and coin history
    Show {
        /// Username
        username: String,
    },
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Add an item to the catalog (or change its price)
    Add {
        /// Item name
        name: String,

        /// Price (e.g., "20")
        price: String,
    },

    /// List catalog items
    List,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        crate::logging::init(self.verbose);

        // `init` creates the file and schema; everything else needs it to exist
        let service = match self.command {
            Commands::Init => ShopService::init(&self.database).await?,
            _ => ShopService::connect(&self.database).await?,
        };

        match self.command {
            Commands::Init => println!("Database initialized: {}", self.database),

            Commands::Account(cmd) => run_account_command(&service, cmd).await?,

            Commands::Item(cmd) => run_item_command(&service, cmd).await?,

            Commands::Buy { username, item } => {
                let purchase = service.buy(&username, &item).await?;
                let account = service.get_account(&username).await?;
                println!(
                    "{} bought {} for {} (balance: {}) ({})",
                    username,
                    purchase.item,
                    format_cents(purchase.price),
                    format_cents(account.balance),
                    purchase.id
                );
            }

            Commands::Send { amount, from, to } => {
                let amount_cents =
                    parse_cents(&amount).context("Invalid amount format. Use '30' or '30.50'")?;
                let transfer = service.send_coins(&from, &to, amount_cents).await?;
                println!(
                    "Sent {} {} -> {} ({})",
                    format_cents(transfer.amount),
                    from,
                    to,
                    transfer.id
                );
            }

            Commands::History { username } => run_history_command(&service, &username).await?,

            Commands::Export {
                export_type,
                user,
                output,
            } => run_export_command(&service, &export_type, &user, output.as_deref()).await?,
        }

        Ok(())
    }
}

async fn run_account_command(service: &ShopService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create { username, balance } => {
            let starting_balance = balance
                .map(|b| parse_cents(&b))
                .transpose()
                .context("Invalid balance format")?;
            let account = service.open_account(&username, starting_balance).await?;
            println!(
                "Opened account: {} with {} ({})",
                account.username,
                format_cents(account.balance),
                account.id
            );
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }

            println!("{:<20} {:>12}", "ACCOUNT", "BALANCE");
            println!("{}", "-".repeat(33));
            let mut total = 0;
            for account in &accounts {
                total += account.balance;
                println!(
                    "{:<20} {:>12}",
                    account.username,
                    format_cents(account.balance)
                );
            }
            println!("{}", "-".repeat(33));
            println!("{:<20} {:>12}", "TOTAL", format_cents(total));
        }

        AccountCommands::Show { username } => {
            let info = service.account_info(&username).await?;

            println!("Account: {}", info.account.username);
            println!("ID: {}", info.account.id);
            println!("Balance: {}", format_cents(info.account.balance));
            println!("Opened: {}", info.account.created_at.format("%Y-%m-%d %H:%M:%S"));

            println!();
            println!("Inventory:");
            if info.inventory.is_empty() {
                println!("  (empty)");
            }
            for entry in &info.inventory {
                println!("  {:<20} x{}", entry.item, entry.quantity);
            }
            println!("Total spent: {}", format_cents(info.total_spent));

            println!();
            println!("Received:");
            if info.received.is_empty() {
                println!("  (none)");
            }
            for flow in &info.received {
                println!("  from {:<15} {:>12}", flow.username, format_cents(flow.amount));
            }

            println!();
            println!("Sent:");
            if info.sent.is_empty() {
                println!("  (none)");
            }
            for flow in &info.sent {
                println!("  to {:<17} {:>12}", flow.username, format_cents(flow.amount));
            }
            println!("Net from transfers: {}", format_cents(info.net_transfers));
        }
    }

    Ok(())
}

async fn run_item_command(service: &ShopService, cmd: ItemCommands) -> Result<()> {
    match cmd {
        ItemCommands::Add { name, price } => {
            let price_cents = parse_cents(&price).context("Invalid price format. Use '20'")?;
            let item = service.add_item(&name, price_cents).await?;
            println!("Catalog item: {} at {}", item.name, format_cents(item.price));
        }

        ItemCommands::List => {
            let items = service.catalog().await?;
            if items.is_empty() {
                println!("Catalog is empty.");
                return Ok(());
            }

            println!("{:<20} {:>12}", "ITEM", "PRICE");
            println!("{}", "-".repeat(33));
            for item in &items {
                println!("{:<20} {:>12}", item.name, format_cents(item.price));
            }
        }
    }

    Ok(())
}

async fn run_history_command(service: &ShopService, username: &str) -> Result<()> {
    let purchases = service.purchases(username).await?;
    let transfers = service.transfers(username).await?;
    let names = service.get_account_names(&transfers).await?;

    println!("Purchases:");
    if purchases.is_empty() {
        println!("  (none)");
    }
    for purchase in &purchases {
        println!(
            "  {}  {:<20} {:>12}",
            purchase.created_at.format("%Y-%m-%d %H:%M"),
            purchase.item,
            format_cents(purchase.price)
        );
    }

    println!();
    println!("Transfers:");
    if transfers.is_empty() {
        println!("  (none)");
    }
    for transfer in &transfers {
        let sender = names.get(&transfer.sender).map(String::as_str).unwrap_or("?");
        let receiver = names
            .get(&transfer.receiver)
            .map(String::as_str)
            .unwrap_or("?");
        println!(
            "  {}  {:<12} -> {:<12} {:>12}",
            transfer.created_at.format("%Y-%m-%d %H:%M"),
            sender,
            receiver,
            format_cents(transfer.amount)
        );
    }

    Ok(())
}

async fn run_export_command(
    service: &ShopService,
    export_type: &str,
    username: &str,
    output: Option<&str>,
) -> Result<()> {
    let writer: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path))?,
        ),
        None => Box::new(io::stdout().lock()),
    };

    let exporter = Exporter::new(service);
    match export_type {
        "purchases" => {
            let count = exporter.export_purchases_csv(username, writer).await?;
            eprintln!("Exported {} purchase(s)", count);
        }
        "transfers" => {
            let count = exporter.export_transfers_csv(username, writer).await?;
            eprintln!("Exported {} transfer(s)", count);
        }
        "history" => exporter.export_history_json(username, writer).await?,
        other => bail!(
            "Unknown export type '{}'. Use purchases, transfers or history",
            other
        ),
    }

    Ok(())
}
