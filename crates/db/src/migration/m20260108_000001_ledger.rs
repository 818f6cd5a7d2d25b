//! Ledger schema.
//!
//! Journal entries with their posting pairs, running balances, closed
//! fiscal periods and the transactional outbox, plus the triggers that keep
//! journal history append-only.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: JOURNAL
        // ============================================================
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_POSTINGS_SQL).await?;

        // ============================================================
        // PART 2: BALANCES & PERIODS
        // ============================================================
        db.execute_unprepared(ACCOUNT_BALANCES_SQL).await?;
        db.execute_unprepared(FISCAL_PERIODS_SQL).await?;

        // ============================================================
        // PART 3: OUTBOX
        // ============================================================
        db.execute_unprepared(OUTBOX_EVENTS_SQL).await?;

        // ============================================================
        // PART 4: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    effective_date DATE NOT NULL,
    status VARCHAR(16) NOT NULL,
    description TEXT NOT NULL,
    reference VARCHAR(255) NOT NULL,
    version BIGINT NOT NULL,
    reversal_of UUID REFERENCES journal_entries(id),
    reversed_by UUID REFERENCES journal_entries(id),
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL,
    CONSTRAINT chk_journal_status CHECK (status IN ('POSTED', 'REVERSED')),
    CONSTRAINT chk_journal_version CHECK (version >= 1),
    CONSTRAINT chk_journal_description CHECK (length(trim(description)) > 0)
);

CREATE INDEX idx_journal_entries_tenant_date ON journal_entries(tenant_id, effective_date, created_at);
CREATE INDEX idx_journal_entries_reference ON journal_entries(tenant_id, reference);
";

const JOURNAL_POSTINGS_SQL: &str = r"
CREATE TABLE journal_postings (
    entry_id UUID NOT NULL REFERENCES journal_entries(id),
    seq INTEGER NOT NULL,
    debit_account VARCHAR(8) NOT NULL,
    credit_account VARCHAR(8) NOT NULL,
    amount NUMERIC NOT NULL,
    currency CHAR(3) NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (entry_id, seq),
    CONSTRAINT chk_posting_amount CHECK (amount > 0),
    CONSTRAINT chk_posting_accounts CHECK (debit_account <> credit_account)
);

CREATE INDEX idx_journal_postings_debit ON journal_postings(debit_account, currency);
CREATE INDEX idx_journal_postings_credit ON journal_postings(credit_account, currency);
";

const ACCOUNT_BALANCES_SQL: &str = r"
CREATE TABLE account_balances (
    account_code VARCHAR(8) NOT NULL,
    currency CHAR(3) NOT NULL,
    amount NUMERIC NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (account_code, currency)
);
";

const FISCAL_PERIODS_SQL: &str = r"
-- A row exists only once a period has been closed; no row means OPEN.
CREATE TABLE fiscal_periods (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    status VARCHAR(8) NOT NULL,
    closed_at TIMESTAMPTZ,
    CONSTRAINT uq_fiscal_period UNIQUE (tenant_id, year, month),
    CONSTRAINT chk_fiscal_month CHECK (month BETWEEN 1 AND 12),
    CONSTRAINT chk_fiscal_status CHECK (status IN ('OPEN', 'CLOSED'))
);
";

const OUTBOX_EVENTS_SQL: &str = r"
CREATE TABLE outbox_events (
    id UUID PRIMARY KEY,
    aggregate_id UUID NOT NULL,
    aggregate_type VARCHAR(64) NOT NULL,
    event_type VARCHAR(128) NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    published_at TIMESTAMPTZ
);

-- Relay scan
CREATE INDEX idx_outbox_unpublished ON outbox_events(created_at, id) WHERE published_at IS NULL;

CREATE INDEX idx_outbox_aggregate ON outbox_events(aggregate_id, created_at);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_journal_delete
-- Journal history is never physically deleted
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_journal_delete()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Journal history is append-only. Create a reversing entry instead.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_entry_delete
BEFORE DELETE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_journal_delete();

CREATE TRIGGER trg_prevent_posting_delete
BEFORE DELETE ON journal_postings
FOR EACH ROW
EXECUTE FUNCTION prevent_journal_delete();

-- ============================================================
-- FUNCTION: prevent_posting_update
-- Posting pairs are immutable once written
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_posting_update()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Posting pairs are immutable.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_posting_update
BEFORE UPDATE ON journal_postings
FOR EACH ROW
EXECUTE FUNCTION prevent_posting_update();

-- ============================================================
-- FUNCTION: prevent_reversed_modification
-- A REVERSED entry is terminal
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_reversed_modification()
RETURNS TRIGGER AS $$
BEGIN
    IF OLD.status = 'REVERSED' THEN
        RAISE EXCEPTION 'Cannot modify reversed journal entry %', OLD.id;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_reversed_mod
BEFORE UPDATE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_reversed_modification();

-- ============================================================
-- FUNCTION: restrict_outbox_update
-- Outbox rows may only be stamped as published
-- ============================================================
CREATE OR REPLACE FUNCTION restrict_outbox_update()
RETURNS TRIGGER AS $$
BEGIN
    IF NEW.id <> OLD.id
        OR NEW.aggregate_id <> OLD.aggregate_id
        OR NEW.aggregate_type <> OLD.aggregate_type
        OR NEW.event_type <> OLD.event_type
        OR NEW.payload <> OLD.payload
        OR NEW.created_at <> OLD.created_at THEN
        RAISE EXCEPTION 'Outbox records are append-only';
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_restrict_outbox_update
BEFORE UPDATE ON outbox_events
FOR EACH ROW
EXECUTE FUNCTION restrict_outbox_update();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS outbox_events CASCADE;
DROP TABLE IF EXISTS fiscal_periods CASCADE;
DROP TABLE IF EXISTS account_balances CASCADE;
DROP TABLE IF EXISTS journal_postings CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP FUNCTION IF EXISTS prevent_journal_delete() CASCADE;
DROP FUNCTION IF EXISTS prevent_posting_update() CASCADE;
DROP FUNCTION IF EXISTS prevent_reversed_modification() CASCADE;
DROP FUNCTION IF EXISTS restrict_outbox_update() CASCADE;
";
