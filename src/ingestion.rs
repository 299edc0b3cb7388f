use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{LedgerError, Rail, money};

/// One scripted ledger operation from a session file.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    Deposit { amount: Decimal, note: String },
    Spend { amount: Decimal, note: String },
    Withdraw { amount: Decimal, note: String },
    Link { rail: Rail, name: String },
    ClaimBonus,
    /// Reserve and dispatch in one step.
    Payout { amount: Decimal, rail: Rail },
    /// Reserve only; stays pending until a later row settles or cancels it.
    Request { amount: Decimal, rail: Rail },
    /// Cancel the most recent payout that is still pending.
    CancelLast,
}

/// Source of session operations for replay.
pub trait SessionStream {
    type OpStream: Stream<Item = Result<SessionOp, LedgerError>>;

    fn stream(&mut self) -> Self::OpStream;
}

/// Reads session scripts in CSV form: `op,amount,rail,note` with the later
/// columns optional per operation.
pub struct CsvSessionReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvSessionReader<R> {
    pub fn new(reader: R) -> Self {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Self { reader: Some(rdr) }
    }
}

/// Internal shape used only for CSV deserialization. Amounts stay raw here;
/// `money::parse_amount` enforces the two-decimal rule per row.
#[derive(Debug, Deserialize)]
struct SessionRow {
    op: String,
    amount: Option<String>,
    rail: Option<Rail>,
    note: Option<String>,
}

impl TryFrom<SessionRow> for SessionOp {
    type Error = LedgerError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let note = |fallback: &str| row.note.clone().unwrap_or_else(|| fallback.to_string());
        let amount = row.amount.as_deref().map(money::parse_amount).transpose()?;

        match (row.op.trim().to_ascii_lowercase().as_str(), amount, row.rail) {
            ("deposit", Some(amount), _) => Ok(Self::Deposit {
                amount,
                note: note("Deposit"),
            }),
            ("spend", Some(amount), _) => Ok(Self::Spend {
                amount,
                note: note("Purchase"),
            }),
            ("withdraw", Some(amount), _) => Ok(Self::Withdraw {
                amount,
                note: note("Withdrawal"),
            }),
            ("link", _, Some(rail)) => Ok(Self::Link {
                rail,
                name: note("Linked method"),
            }),
            ("claim_bonus", _, _) => Ok(Self::ClaimBonus),
            ("payout", Some(amount), Some(rail)) => Ok(Self::Payout { amount, rail }),
            ("request", Some(amount), Some(rail)) => Ok(Self::Request { amount, rail }),
            ("cancel_last", _, _) => Ok(Self::CancelLast),
            (other, amount, rail) => Err(LedgerError::Ingestion(format!(
                "invalid session row: op='{other}' amount={amount:?} rail={rail:?}"
            ))),
        }
    }
}

impl<R: Read + Send + 'static> SessionStream for CsvSessionReader<R> {
    type OpStream = Pin<Box<dyn Stream<Item = Result<SessionOp, LedgerError>> + Send>>;

    fn stream(&mut self) -> Self::OpStream {
        // Take ownership of the reader so the iterator we build owns all data and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<SessionOp, LedgerError>>::new()));
            }
        };

        let iter = reader
            .into_deserialize::<SessionRow>()
            .map(|row_res| match row_res {
                Ok(row) => SessionOp::try_from(row),
                Err(e) => Err(LedgerError::Ingestion(format!(
                    "CSV deserialization error: {}",
                    e
                ))),
            });

        Box::pin(stream::iter(iter))
    }
}
