//! Command-line front end
//!
//! Each subcommand maps onto one user flow. Output meant for the user goes to
//! stdout; diagnostics go through `tracing` to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::{
    CollectionAccount, CollectionRequest, LoginRequest, NewBeneficiary, RegisterRequest, Tier,
    TierUpgradeRequest,
};
use crate::payment::{PaymentContext, PaymentIntent, PollEvent, PollOutcome, PollerConfig, VerificationPoller};
use crate::session::{require_token, token_source, SessionStore, TokenSource};
use crate::types::AppError;

#[derive(Debug, Parser)]
#[command(name = "payportal", version, about = "Send money abroad from the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Two-letter country code, e.g. GB
        #[arg(long)]
        country: String,
        #[arg(long, env = "PAYPORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "PAYPORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Look up an exchange rate
    Rates {
        from: String,
        to: String,
        /// Also show what the recipient gets for this amount
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Manage saved recipients
    Beneficiaries {
        #[command(subcommand)]
        action: BeneficiaryCommand,
    },
    /// Get a collection account to pay into, then wait for the transfer
    Collect {
        amount: Decimal,
        currency: String,
        #[arg(long)]
        beneficiary: Option<String>,
        /// Print the account details and exit without waiting
        #[arg(long)]
        no_wait: bool,
    },
    /// Check whether a payment has arrived
    Verify {
        #[arg(long)]
        reference: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Show the signed-in profile
    Profile,
    /// Request a higher account tier
    Upgrade {
        tier: Tier,
        #[arg(long)]
        document_type: String,
        #[arg(long)]
        document_number: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum BeneficiaryCommand {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        bank: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        currency: String,
        #[arg(long)]
        country: Option<String>,
    },
    Remove {
        id: String,
    },
}

/// Wiring shared by all commands
pub struct App {
    config: Config,
    client: ApiClient,
    tokens: Arc<dyn TokenSource>,
    store: SessionStore,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = ApiClient::from_config(&config.api)?;
        let tokens = token_source(&config.session);
        let store = SessionStore::new(&config.session.data_dir);
        Ok(Self { config, client, tokens, store })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Register { first_name, last_name, email, country, password } => {
                let request = RegisterRequest { first_name, last_name, email, password, country };
                let token = self.client.register(&request).await?;
                self.store.save(&token.token).await?;
                println!("Welcome aboard, {}. You are signed in.", request.first_name);
            }
            Command::Login { email, password } => {
                let token = self.client.login(&LoginRequest { email, password }).await?;
                self.store.save(&token.token).await?;
                match token.expires_at {
                    Some(expires) => println!("Signed in. Session valid until {}.", expires.format("%Y-%m-%d %H:%M UTC")),
                    None => println!("Signed in."),
                }
            }
            Command::Logout => {
                self.store.clear().await?;
                println!("Signed out.");
            }
            Command::Rates { from, to, amount } => {
                let rate = self.client.exchange_rate(&from, &to).await?;
                println!("1 {} = {} {}", rate.from, rate.rate, rate.to);
                if let Some(fee) = rate.fee {
                    println!("Transfer fee: {} {}", fee, rate.from);
                }
                if let Some(amount) = amount {
                    println!("{} {} -> {} {}", amount, rate.from, rate.convert(amount), rate.to);
                }
            }
            Command::Beneficiaries { action } => self.beneficiaries(action).await?,
            Command::Collect { amount, currency, beneficiary, no_wait } => {
                let token = require_token(self.tokens.as_ref()).await?;
                let request = CollectionRequest::new(amount, &currency, beneficiary)?;
                let account = self.client.create_collection_account(&request, &token).await?;
                print_collection_account(&account);

                if !no_wait {
                    let intent = PaymentIntent::try_from(&account)?;
                    self.verify(intent).await?;
                }
            }
            Command::Verify { reference, amount, currency } => {
                let intent = PaymentIntent::new(reference, amount, currency)?;
                self.verify(intent).await?;
            }
            Command::Profile => {
                let token = require_token(self.tokens.as_ref()).await?;
                let profile = self.client.profile(&token).await?;
                println!("{} <{}>", profile.full_name(), profile.email);
                println!("Tier: {}{}", profile.tier, if profile.verified { " (verified)" } else { "" });
                if let Some(limit) = profile.daily_limit {
                    println!("Daily limit: {}", limit);
                }
            }
            Command::Upgrade { tier, document_type, document_number } => {
                let token = require_token(self.tokens.as_ref()).await?;
                let request = TierUpgradeRequest { tier, document_type, document_number };
                let response = self.client.request_tier_upgrade(&request, &token).await?;
                println!("Upgrade to {}: {}", tier, response.status);
                if !response.message.is_empty() {
                    println!("{}", response.message);
                }
            }
        }
        Ok(())
    }

    async fn beneficiaries(&self, action: BeneficiaryCommand) -> Result<()> {
        let token = require_token(self.tokens.as_ref()).await?;
        match action {
            BeneficiaryCommand::List => {
                let list = self.client.list_beneficiaries(&token).await?;
                if list.is_empty() {
                    println!("No saved beneficiaries.");
                }
                for b in list {
                    println!("{:<12} {:<24} {:<20} {} {}", b.id, b.name, b.bank_name, b.account_number, b.currency);
                }
            }
            BeneficiaryCommand::Add { name, bank, account, currency, country } => {
                let new = NewBeneficiary {
                    name,
                    bank_name: bank,
                    account_number: account,
                    currency: currency.to_ascii_uppercase(),
                    country,
                };
                let created = self.client.add_beneficiary(&new, &token).await?;
                println!("Saved {} ({}).", created.name, created.id);
            }
            BeneficiaryCommand::Remove { id } => {
                self.client.remove_beneficiary(&id, &token).await?;
                println!("Removed {}.", id);
            }
        }
        Ok(())
    }

    /// Poll until the payment for `intent` is confirmed, the budget runs out,
    /// or the user interrupts.
    async fn verify(&self, intent: PaymentIntent) -> Result<PollOutcome> {
        let config = PollerConfig::from(&self.config.verification);
        let context = PaymentContext::begin(intent);

        let poller = VerificationPoller::new(
            Arc::new(self.client.clone()),
            self.tokens.clone(),
            context.clone(),
            config,
        )?
        .on_verified(|intent, state| {
            println!("Payment of {} received. {}", intent, state.message);
            println!("Your transfer is on its way. Run `payportal profile` to see your limits.");
        });

        println!(
            "Waiting for your transfer (checking every {}s, up to {} times). Ctrl-C to stop.",
            config.interval.as_secs(),
            config.max_attempts
        );
        let mut handle = poller.spawn();

        let interrupted = loop {
            let event = tokio::select! {
                event = handle.next_event() => event,
                _ = tokio::signal::ctrl_c() => break true,
            };
            match event {
                Some(event) => print_event(&event, config.max_attempts),
                None => break false,
            }
        };

        let outcome = if interrupted {
            handle.cancel().await
        } else {
            handle.wait().await
        };
        info!(?outcome, "Verification flow finished");

        match &outcome {
            PollOutcome::Verified { .. } => {}
            PollOutcome::Exhausted { .. } => {
                println!("We have not seen the payment yet. If you have already sent it, check again later with `payportal verify`.");
            }
            PollOutcome::Unauthenticated => {
                context.clear();
                return Err(AppError::MissingAuth.into());
            }
            PollOutcome::Cancelled { attempts } => {
                println!("Stopped after {} check(s). The payment reference stays valid.", attempts);
            }
        }

        context.clear();
        Ok(outcome)
    }
}

fn print_collection_account(account: &CollectionAccount) {
    println!("Transfer {} {} to:", account.amount, account.currency);
    println!("  Bank:      {}", account.bank_name);
    println!("  Account:   {}", account.account_number);
    println!("  Name:      {}", account.account_name);
    println!("  Reference: {}", account.reference);
    if let Some(expires) = account.expires_at {
        println!("  Expires:   {}", expires.format("%Y-%m-%d %H:%M UTC"));
    }
}

fn print_event(event: &PollEvent, max_attempts: u32) {
    match event {
        PollEvent::Pending { attempt, message } => {
            println!("[{}/{}] Not received yet. {}", attempt, max_attempts, message);
        }
        PollEvent::Failed { attempt, message } => {
            println!("[{}/{}] Could not check: {}", attempt, max_attempts, message);
        }
        // Reported by the success consumer or the outcome handling in `verify`
        PollEvent::Verified { .. } | PollEvent::Exhausted { .. } | PollEvent::Unauthenticated { .. } => {}
    }
}
