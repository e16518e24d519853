//! Non-order expense export (§4.5 step 5, §3 ExpenseBatch). Builds one XLSX
//! workbook per export run and snapshots the included rows; the actual
//! cloud-storage upload and the ERP-side CSV/XLSX import are out of scope
//! (§1 Non-goals) — this module owns everything up to producing the bytes
//! and recording the batch's forward-only status transitions.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, XlsxError};
use sqlx::PgPool;
use thiserror::Error;

use crate::domain::{Expense, ExpenseStatus};

#[derive(Debug, Error)]
pub enum ExpenseExportError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("xlsx generation error: {0}")]
    Xlsx(#[from] XlsxError),
}

#[derive(Debug)]
pub struct ExportResult {
    pub batch_id: i64,
    pub row_count: usize,
    pub total_amount: BigDecimal,
    pub xlsx_bytes: Vec<u8>,
}

pub struct ExpenseExporter<'a> {
    pool: &'a PgPool,
}

const HEADER: [&str; 7] =
    ["payment_id", "expense_type", "direction", "amount", "occurred_on", "suggested_category", "description"];

impl<'a> ExpenseExporter<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Batches every still-uncategorized-for-export expense in the range
    /// into one workbook (§3 ExpenseBatch: generated → exported → imported,
    /// forward-only).
    pub async fn export(
        &self,
        seller_slug: &str,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Option<ExportResult>, ExpenseExportError> {
        let rows = sqlx::query_as!(
            Expense,
            r#"
            SELECT id, seller_slug, payment_id, source as "source: _", expense_type,
                   direction as "direction: _", amount, occurred_on, description, beneficiary,
                   suggested_category, status as "status: _", batch_id, created_at, updated_at
            FROM expenses
            WHERE seller_slug = $1 AND occurred_on BETWEEN $2 AND $3 AND batch_id IS NULL
            ORDER BY occurred_on, id
            "#,
            seller_slug,
            range_start,
            range_end,
        )
        .fetch_all(self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let total_amount: BigDecimal = rows.iter().map(|r| r.amount.clone()).sum();
        let xlsx_bytes = build_workbook(&rows)?;

        let mut tx = self.pool.begin().await?;

        let batch_id = sqlx::query_scalar!(
            r#"
            INSERT INTO expense_batches (seller_slug, status, row_count, total_amount, range_start, range_end, exported_at)
            VALUES ($1, 'exported', $2, $3, $4, $5, NOW())
            RETURNING id
            "#,
            seller_slug,
            rows.len() as i32,
            total_amount.clone(),
            range_start,
            range_end,
        )
        .fetch_one(&mut *tx)
        .await?;

        for row in &rows {
            let row_data = serde_json::to_value(row).unwrap_or(serde_json::Value::Null);
            sqlx::query!(
                r#"INSERT INTO expense_batch_items (batch_id, expense_id, row_data) VALUES ($1, $2, $3)"#,
                batch_id,
                row.id,
                row_data,
            )
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query!(
            r#"UPDATE expenses SET batch_id = $1, status = $2, updated_at = NOW() WHERE id = ANY($3)"#,
            batch_id,
            ExpenseStatus::Exported as _,
            &rows.iter().map(|r| r.id).collect::<Vec<_>>(),
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(ExportResult {
            batch_id,
            row_count: rows.len(),
            total_amount,
            xlsx_bytes,
        }))
    }

    /// Marks a previously-exported batch as imported once the ERP side has
    /// consumed it. The import mechanism itself is external (§1 Non-goals).
    pub async fn mark_imported(&self, batch_id: i64) -> Result<(), ExpenseExportError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query!(
            r#"UPDATE expense_batches SET status = 'imported', imported_at = NOW() WHERE id = $1 AND status = 'exported'"#,
            batch_id,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query!(
            r#"UPDATE expenses SET status = $2, updated_at = NOW() WHERE batch_id = $1"#,
            batch_id,
            ExpenseStatus::Imported as _,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn build_workbook(rows: &[Expense]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, title) in HEADER.iter().enumerate() {
        sheet.write(0, col as u16, *title)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = (idx + 1) as u32;
        sheet.write(r, 0, row.payment_id.as_str())?;
        sheet.write(r, 1, row.expense_type.as_str())?;
        sheet.write(r, 2, format!("{:?}", row.direction))?;
        sheet.write(r, 3, row.amount.to_string())?;
        sheet.write(r, 4, row.occurred_on.to_string())?;
        sheet.write(r, 5, row.suggested_category.as_deref().unwrap_or(""))?;
        sheet.write(r, 6, row.description.as_deref().unwrap_or(""))?;
    }

    workbook.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_has_one_column_per_field() {
        assert_eq!(HEADER.len(), 7);
    }
}
