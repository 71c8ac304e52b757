// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use clap::Parser;
use coin_ledger::{
    AccountId, Coins, Engine, EngineConfig, ExternalRef, LedgerError, LedgerStore, PaymentEvent,
    Reconciler, TransactionId,
};
use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Coin Ledger - Replay wallet operations from a CSV file
///
/// Reads operations from a CSV file, applies them to a fresh ledger and
/// writes the resulting balances to stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "coin-ledger")]
#[command(about = "Replays wallet operations and prints account balances", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,account,counterparty,amount,reference
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Longest wait for an account lock, in milliseconds
    #[arg(long, env = "COIN_LEDGER_LOCK_TIMEOUT_MS", default_value_t = 2_000)]
    lock_timeout_ms: u64,

    /// Default page size for history listings
    #[arg(long, env = "COIN_LEDGER_PAGE_SIZE", default_value_t = EngineConfig::DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

impl Args {
    fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_page_size(self.page_size)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %args.input.display(), error = %e, "cannot open input");
            process::exit(1);
        }
    };

    let engine = match process_operations(BufReader::new(file), args.config()) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "cannot process operations");
            process::exit(1);
        }
    };

    if let Err(e) = write_balances(engine.as_ref(), std::io::stdout()) {
        error!(error = %e, "cannot write output");
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, account, counterparty, amount, reference`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    account: u64,
    #[serde(deserialize_with = "csv::invalid_option")]
    counterparty: Option<u64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Coins>,
    #[serde(default)]
    reference: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("unknown operation '{0}'")]
    UnknownOp(String),

    #[error("missing field '{0}'")]
    Missing(&'static str),

    #[error("invalid transaction id '{0}'")]
    BadTransactionId(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, RowError> {
    value.ok_or(RowError::Missing(field))
}

fn reference(record: &CsvRecord) -> Option<String> {
    record
        .reference
        .as_deref()
        .filter(|reference| !reference.is_empty())
        .map(str::to_owned)
}

fn apply<S: LedgerStore>(
    engine: &Engine<S>,
    reconciler: &Reconciler<S>,
    record: CsvRecord,
) -> Result<(), RowError> {
    let account = AccountId(record.account);

    match record.op.to_lowercase().as_str() {
        "open" => {
            engine.open_account(account)?;
        }
        "reward" => {
            let amount = required(record.amount, "amount")?;
            engine.reward(account, amount, format!("Reward of {amount} coins"))?;
        }
        "spend" => {
            engine.spend(account, required(record.amount, "amount")?)?;
        }
        "transfer" => {
            let recipient = AccountId(required(record.counterparty, "counterparty")?);
            engine.transfer(account, recipient, required(record.amount, "amount")?)?;
        }
        "refund" => {
            let raw = required(reference(&record), "reference")?;
            let id = raw
                .parse::<u64>()
                .map_err(|_| RowError::BadTransactionId(raw.clone()))?;
            engine.refund(account, TransactionId(id))?;
        }
        "cashout" => {
            engine.cashout(account, required(record.amount, "amount")?)?;
        }
        "payout" => {
            engine.set_payout_account(account, reference(&record))?;
        }
        "purchase" => {
            let event = PaymentEvent::PurchaseCompleted {
                account_id: Some(account),
                coin_amount: record.amount.unwrap_or(0),
                external_ref: ExternalRef::new(required(reference(&record), "reference")?),
            };
            let ack = reconciler.handle(event)?;
            debug!(?ack, "purchase event handled");
        }
        other => return Err(RowError::UnknownOp(other.to_owned())),
    }
    Ok(())
}

/// Process operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are handled without
/// loading them into memory. Malformed rows and rejected operations are
/// logged and skipped.
///
/// # CSV Format
///
/// Expected columns: `op, account, counterparty, amount, reference`
/// - `op`: open, reward, spend, transfer, refund, cashout, payout, purchase
/// - `account`: acting account id
/// - `counterparty`: transfer recipient
/// - `amount`: whole coins
/// - `reference`: transaction id (refund), payout reference (payout) or
///   external event reference (purchase)
///
/// # Example
///
/// ```csv
/// op,account,counterparty,amount,reference
/// open,1,,,
/// purchase,1,,100,cs_1
/// spend,1,,40,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn process_operations<R: Read>(
    reader: R,
    config: EngineConfig,
) -> Result<Arc<Engine>, csv::Error> {
    let engine = Arc::new(Engine::with_config(config));
    let reconciler = Reconciler::new(Arc::clone(&engine));

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        match result {
            Ok(record) => {
                if let Err(e) = apply(engine.as_ref(), &reconciler, record) {
                    warn!(row = line + 1, error = %e, "skipping operation");
                }
            }
            Err(e) => {
                warn!(row = line + 1, error = %e, "skipping malformed row");
            }
        }
    }

    Ok(engine)
}

/// One output row.
#[derive(Debug, Serialize)]
struct BalanceRow {
    account: AccountId,
    balance: Coins,
    transactions: u64,
}

/// Write account balances to a CSV writer
///
/// # CSV Format
///
/// Columns: `account, balance, transactions`
///
/// # Errors
///
/// Returns a CSV error if writing fails or the store cannot be read.
pub fn write_balances<S: LedgerStore, W: Write>(
    engine: &Engine<S>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    let accounts = engine.store().accounts().map_err(to_csv_error)?;
    for account in accounts {
        let transactions = engine
            .store()
            .count_transactions(account.id)
            .map_err(to_csv_error)?;
        wtr.serialize(BalanceRow {
            account: account.id,
            balance: account.balance,
            transactions,
        })?;
    }

    wtr.flush()?;
    Ok(())
}

fn to_csv_error(err: LedgerError) -> csv::Error {
    csv::Error::from(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(csv: &str) -> Arc<Engine> {
        process_operations(Cursor::new(csv.to_owned()), EngineConfig::default()).unwrap()
    }

    #[test]
    fn parse_open_and_purchase() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          purchase,1,,100,cs_1\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 100);
    }

    #[test]
    fn duplicate_purchase_rows_credit_once() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          purchase,1,,100,cs_1\n\
                          purchase,1,,100,cs_1\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 100);
        assert_eq!(engine.store().count_transactions(AccountId(1)).unwrap(), 1);
    }

    #[test]
    fn parse_spend_and_transfer() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          open,2,,,\n\
                          reward,1,,100,\n\
                          spend,1,,50,\n\
                          transfer,1,2,25,\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 25);
        assert_eq!(engine.balance(AccountId(2)).unwrap(), 25);
    }

    #[test]
    fn parse_with_whitespace() {
        let engine = run("op,account,counterparty,amount,reference\n \
                          open , 1 , , , \n \
                          reward , 1 , , 10 , \n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 10);
    }

    #[test]
    fn refund_by_transaction_id() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          purchase,1,,100,cs_1\n\
                          spend,1,,70,\n\
                          refund,1,,,1\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 0);
    }

    #[test]
    fn skip_malformed_and_rejected_rows() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          invalid,row,data,here,x\n\
                          spend,1,,5,\n\
                          explode,1,,,\n\
                          reward,1,,7,\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 7);
    }

    #[test]
    fn cashout_after_payout_link() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,1,,,\n\
                          reward,1,,10,\n\
                          cashout,1,,4,\n\
                          payout,1,,,acct_1\n\
                          cashout,1,,4,\n");
        assert_eq!(engine.balance(AccountId(1)).unwrap(), 6);
    }

    #[test]
    fn write_balances_to_csv() {
        let engine = run("op,account,counterparty,amount,reference\n\
                          open,2,,,\n\
                          open,1,,,\n\
                          reward,1,,5,\n");

        let mut output = Vec::new();
        write_balances(engine.as_ref(), &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_eq!(output, "account,balance,transactions\n1,5,1\n2,0,0\n");
    }
}
