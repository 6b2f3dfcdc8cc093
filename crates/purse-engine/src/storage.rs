use crate::groups::GroupState;
use purse_types::{
    Account, AccountId, Amount, EntryKind, EntryStatus, EntryToken, GroupId, Invitation,
    LedgerEntry, PaymentMethod, PurseError, SavingsTarget, Tier, UserId,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Persistence backend configuration.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Keep all state in process memory only.
    Memory,
    /// Mirror every committed write to PostgreSQL and hydrate state on
    /// startup.
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Everything the mirror held at startup, replayed into the in-memory
/// registries by engine bootstrap.
#[derive(Debug, Default)]
pub struct PersistedState {
    pub accounts: Vec<Account>,
    pub entries: Vec<LedgerEntry>,
    pub groups: Vec<GroupState>,
    pub invitations: Vec<Invitation>,
    pub targets: Vec<SavingsTarget>,
}

#[derive(Clone, Debug)]
enum StorageBackend {
    Memory,
    Postgres(PostgresStore),
}

/// Write-through mirror of engine state.
///
/// The in-memory registries stay authoritative; each committed operation is
/// persisted here before its in-memory commit, inside the critical section
/// that owns the affected rows. Multi-row writes (a ledger entry plus the
/// account snapshots it moved) share one database transaction so a crash
/// never leaves a half-recorded movement.
#[derive(Clone, Debug)]
pub struct StateStore {
    backend: StorageBackend,
}

impl StateStore {
    pub async fn bootstrap(config: StorageConfig) -> Result<Self, PurseError> {
        match config {
            StorageConfig::Memory => Ok(Self {
                backend: StorageBackend::Memory,
            }),
            StorageConfig::Postgres {
                database_url,
                max_connections,
            } => {
                let store = PostgresStore::connect(&database_url, max_connections).await?;
                store.ensure_schema().await?;
                Ok(Self {
                    backend: StorageBackend::Postgres(store),
                })
            }
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.backend {
            StorageBackend::Memory => "memory",
            StorageBackend::Postgres(_) => "postgres",
        }
    }

    /// Load persisted state at startup. Memory backends have nothing to
    /// replay.
    pub async fn hydrate(&self) -> Result<Option<PersistedState>, PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(None),
            StorageBackend::Postgres(store) => {
                let state = PersistedState {
                    accounts: store.load_accounts().await?,
                    entries: store.load_entries().await?,
                    groups: store.load_groups().await?,
                    invitations: store.load_invitations().await?,
                    targets: store.load_targets().await?,
                };
                Ok(Some(state))
            }
        }
    }

    pub async fn persist_account(&self, account: &Account) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.persist_account(account).await,
        }
    }

    /// Persist one settled movement: the new ledger entry, the account rows
    /// it touched, and optionally the group or target snapshot it updated.
    pub async fn persist_movement(
        &self,
        accounts: &[&Account],
        entry: &LedgerEntry,
        group: Option<&GroupState>,
        target: Option<&SavingsTarget>,
    ) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => {
                store.persist_movement(accounts, entry, group, target).await
            }
        }
    }

    /// Persist a pending gateway entry. No account rows change yet.
    pub async fn persist_pending_entry(&self, entry: &LedgerEntry) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.insert_entry_standalone(entry).await,
        }
    }

    /// Persist the settlement of a pending entry together with the account
    /// rows it credited (empty for failed settlements).
    pub async fn persist_settlement(
        &self,
        accounts: &[&Account],
        entry: &LedgerEntry,
    ) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.persist_settlement(accounts, entry).await,
        }
    }

    /// Persist a group snapshot, optionally with an account row updated in
    /// the same transaction (the creator's group quota).
    pub async fn persist_group(
        &self,
        group: &GroupState,
        account: Option<&Account>,
    ) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.persist_group(group, account).await,
        }
    }

    pub async fn remove_group(
        &self,
        group_id: &GroupId,
        creator: &Account,
    ) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.remove_group(group_id, creator).await,
        }
    }

    pub async fn persist_invitation(&self, invitation: &Invitation) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.persist_invitation(invitation).await,
        }
    }

    pub async fn persist_target(&self, target: &SavingsTarget) -> Result<(), PurseError> {
        match &self.backend {
            StorageBackend::Memory => Ok(()),
            StorageBackend::Postgres(store) => store.persist_target(target).await,
        }
    }
}

#[derive(Clone, Debug)]
struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, PurseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| PurseError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), PurseError> {
        // Accounts and ledger entries get typed tables; group, invitation,
        // and target aggregates are mirrored as JSONB snapshots keyed by id.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purse_accounts (
                account_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                balance_minor BIGINT NOT NULL,
                tier TEXT NOT NULL,
                purchases_this_month INTEGER NOT NULL,
                counter_month TEXT NOT NULL,
                groups_created INTEGER NOT NULL,
                archived BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS purse_ledger_entries (
                seq BIGSERIAL PRIMARY KEY,
                token TEXT NOT NULL UNIQUE,
                source TEXT NULL,
                destination TEXT NULL,
                amount_minor BIGINT NOT NULL,
                kind TEXT NOT NULL,
                method TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                settled_at TIMESTAMPTZ NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_purse_entries_source ON purse_ledger_entries (source)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres index create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_purse_entries_destination ON purse_ledger_entries (destination)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres index create failed: {e}")))?;

        for table in ["purse_groups", "purse_invitations", "purse_targets"] {
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    state JSONB NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )
                "#
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| PurseError::Storage(format!("postgres schema create failed: {e}")))?;
        }

        Ok(())
    }

    async fn load_accounts(&self) -> Result<Vec<Account>, PurseError> {
        let rows = sqlx::query(
            r#"
            SELECT
                account_id, user_id, balance_minor, tier, purchases_this_month,
                counter_month, groups_created, archived, created_at, updated_at
            FROM purse_accounts
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres load accounts failed: {e}")))?;

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let balance: i64 = row
                .try_get("balance_minor")
                .map_err(|e| PurseError::Storage(format!("postgres decode balance failed: {e}")))?;
            let tier_str: String = row
                .try_get("tier")
                .map_err(|e| PurseError::Storage(format!("postgres decode tier failed: {e}")))?;
            let purchases: i32 = row.try_get("purchases_this_month").map_err(|e| {
                PurseError::Storage(format!("postgres decode purchases failed: {e}"))
            })?;
            let groups_created: i32 = row.try_get("groups_created").map_err(|e| {
                PurseError::Storage(format!("postgres decode groups_created failed: {e}"))
            })?;

            accounts.push(Account {
                id: AccountId::new(get_text(&row, "account_id")?),
                user_id: UserId::new(get_text(&row, "user_id")?),
                balance: amount_from_db(balance)?,
                tier: parse_tier(&tier_str)?,
                purchases_this_month: purchases.try_into().map_err(|_| {
                    PurseError::Storage("negative purchase counter in storage".to_string())
                })?,
                counter_month: get_text(&row, "counter_month")?,
                groups_created: groups_created.try_into().map_err(|_| {
                    PurseError::Storage("negative group counter in storage".to_string())
                })?,
                archived: row.try_get("archived").map_err(|e| {
                    PurseError::Storage(format!("postgres decode archived failed: {e}"))
                })?,
                created_at: row.try_get("created_at").map_err(|e| {
                    PurseError::Storage(format!("postgres decode created_at failed: {e}"))
                })?,
                updated_at: row.try_get("updated_at").map_err(|e| {
                    PurseError::Storage(format!("postgres decode updated_at failed: {e}"))
                })?,
            });
        }

        Ok(accounts)
    }

    async fn load_entries(&self) -> Result<Vec<LedgerEntry>, PurseError> {
        let rows = sqlx::query(
            r#"
            SELECT token, source, destination, amount_minor, kind, method,
                   status, created_at, settled_at
            FROM purse_ledger_entries
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres load entries failed: {e}")))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let amount: i64 = row
                .try_get("amount_minor")
                .map_err(|e| PurseError::Storage(format!("postgres decode amount failed: {e}")))?;
            let kind_str: String = row
                .try_get("kind")
                .map_err(|e| PurseError::Storage(format!("postgres decode kind failed: {e}")))?;
            let method_str: String = row
                .try_get("method")
                .map_err(|e| PurseError::Storage(format!("postgres decode method failed: {e}")))?;
            let status_str: String = row
                .try_get("status")
                .map_err(|e| PurseError::Storage(format!("postgres decode status failed: {e}")))?;
            let source: Option<String> = row
                .try_get("source")
                .map_err(|e| PurseError::Storage(format!("postgres decode source failed: {e}")))?;
            let destination: Option<String> = row.try_get("destination").map_err(|e| {
                PurseError::Storage(format!("postgres decode destination failed: {e}"))
            })?;

            entries.push(LedgerEntry {
                token: EntryToken::new(get_text(&row, "token")?),
                source: source.map(AccountId::new),
                destination: destination.map(AccountId::new),
                amount: amount_from_db(amount)?,
                kind: parse_kind(&kind_str)?,
                method: parse_method(&method_str),
                status: parse_status(&status_str)?,
                created_at: row.try_get("created_at").map_err(|e| {
                    PurseError::Storage(format!("postgres decode created_at failed: {e}"))
                })?,
                settled_at: row.try_get("settled_at").map_err(|e| {
                    PurseError::Storage(format!("postgres decode settled_at failed: {e}"))
                })?,
            });
        }

        Ok(entries)
    }

    async fn load_groups(&self) -> Result<Vec<GroupState>, PurseError> {
        self.load_snapshots("purse_groups").await
    }

    async fn load_invitations(&self) -> Result<Vec<Invitation>, PurseError> {
        self.load_snapshots("purse_invitations").await
    }

    async fn load_targets(&self) -> Result<Vec<SavingsTarget>, PurseError> {
        self.load_snapshots("purse_targets").await
    }

    async fn load_snapshots<T: serde::de::DeserializeOwned>(
        &self,
        table: &str,
    ) -> Result<Vec<T>, PurseError> {
        let rows = sqlx::query(&format!(
            "SELECT state FROM {table} ORDER BY updated_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres load {table} failed: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let state: serde_json::Value = row
                .try_get("state")
                .map_err(|e| PurseError::Storage(format!("postgres decode state failed: {e}")))?;
            out.push(
                serde_json::from_value(state)
                    .map_err(|e| PurseError::Serialization(e.to_string()))?,
            );
        }
        Ok(out)
    }

    async fn persist_account(&self, account: &Account) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        upsert_account(&mut tx, account).await?;
        self.commit(tx).await
    }

    async fn persist_movement(
        &self,
        accounts: &[&Account],
        entry: &LedgerEntry,
        group: Option<&GroupState>,
        target: Option<&SavingsTarget>,
    ) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        insert_entry(&mut tx, entry).await?;
        for account in accounts {
            upsert_account(&mut tx, account).await?;
        }
        if let Some(state) = group {
            upsert_snapshot(&mut tx, "purse_groups", &state.group.id.0, state).await?;
        }
        if let Some(target) = target {
            upsert_snapshot(&mut tx, "purse_targets", &target.id.0, target).await?;
        }
        self.commit(tx).await
    }

    async fn insert_entry_standalone(&self, entry: &LedgerEntry) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        insert_entry(&mut tx, entry).await?;
        self.commit(tx).await
    }

    async fn persist_settlement(
        &self,
        accounts: &[&Account],
        entry: &LedgerEntry,
    ) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            "UPDATE purse_ledger_entries SET status = $1, settled_at = $2 WHERE token = $3",
        )
        .bind(status_to_str(&entry.status))
        .bind(entry.settled_at)
        .bind(&entry.token.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| PurseError::Storage(format!("postgres settle failed: {e}")))?;

        for account in accounts {
            upsert_account(&mut tx, account).await?;
        }
        self.commit(tx).await
    }

    async fn persist_group(
        &self,
        group: &GroupState,
        account: Option<&Account>,
    ) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        upsert_snapshot(&mut tx, "purse_groups", &group.group.id.0, group).await?;
        if let Some(account) = account {
            upsert_account(&mut tx, account).await?;
        }
        self.commit(tx).await
    }

    async fn remove_group(&self, group_id: &GroupId, creator: &Account) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        sqlx::query("DELETE FROM purse_groups WHERE id = $1")
            .bind(&group_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| PurseError::Storage(format!("postgres group delete failed: {e}")))?;
        upsert_account(&mut tx, creator).await?;
        self.commit(tx).await
    }

    async fn persist_invitation(&self, invitation: &Invitation) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        upsert_snapshot(&mut tx, "purse_invitations", &invitation.id.0, invitation).await?;
        self.commit(tx).await
    }

    async fn persist_target(&self, target: &SavingsTarget) -> Result<(), PurseError> {
        let mut tx = self.begin().await?;
        upsert_snapshot(&mut tx, "purse_targets", &target.id.0, target).await?;
        self.commit(tx).await
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, PurseError> {
        self.pool
            .begin()
            .await
            .map_err(|e| PurseError::Storage(format!("postgres begin failed: {e}")))
    }

    async fn commit(
        &self,
        tx: sqlx::Transaction<'static, sqlx::Postgres>,
    ) -> Result<(), PurseError> {
        tx.commit()
            .await
            .map_err(|e| PurseError::Storage(format!("postgres commit failed: {e}")))
    }
}

async fn upsert_account(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    account: &Account,
) -> Result<(), PurseError> {
    let balance = amount_to_db(account.balance)?;
    let purchases: i32 = account.purchases_this_month.try_into().map_err(|_| {
        PurseError::Storage("purchase counter exceeds postgres INTEGER range".to_string())
    })?;
    let groups_created: i32 = account.groups_created.try_into().map_err(|_| {
        PurseError::Storage("group counter exceeds postgres INTEGER range".to_string())
    })?;

    sqlx::query(
        r#"
        INSERT INTO purse_accounts (
            account_id, user_id, balance_minor, tier, purchases_this_month,
            counter_month, groups_created, archived, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (account_id) DO UPDATE SET
            balance_minor = EXCLUDED.balance_minor,
            tier = EXCLUDED.tier,
            purchases_this_month = EXCLUDED.purchases_this_month,
            counter_month = EXCLUDED.counter_month,
            groups_created = EXCLUDED.groups_created,
            archived = EXCLUDED.archived,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&account.id.0)
    .bind(&account.user_id.0)
    .bind(balance)
    .bind(tier_to_str(&account.tier))
    .bind(purchases)
    .bind(&account.counter_month)
    .bind(groups_created)
    .bind(account.archived)
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| PurseError::Storage(format!("postgres account upsert failed: {e}")))?;

    Ok(())
}

async fn insert_entry(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    entry: &LedgerEntry,
) -> Result<(), PurseError> {
    let amount = amount_to_db(entry.amount)?;
    sqlx::query(
        r#"
        INSERT INTO purse_ledger_entries (
            token, source, destination, amount_minor, kind, method,
            status, created_at, settled_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&entry.token.0)
    .bind(entry.source.as_ref().map(|id| id.0.clone()))
    .bind(entry.destination.as_ref().map(|id| id.0.clone()))
    .bind(amount)
    .bind(kind_to_str(&entry.kind))
    .bind(entry.method.to_string())
    .bind(status_to_str(&entry.status))
    .bind(entry.created_at)
    .bind(entry.settled_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| PurseError::Storage(format!("postgres entry insert failed: {e}")))?;

    Ok(())
}

async fn upsert_snapshot<T: serde::Serialize>(
    tx: &mut sqlx::Transaction<'static, sqlx::Postgres>,
    table: &str,
    id: &str,
    state: &T,
) -> Result<(), PurseError> {
    let payload = serde_json::to_value(state).map_err(|e| PurseError::Serialization(e.to_string()))?;
    sqlx::query(&format!(
        r#"
        INSERT INTO {table} (id, state, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (id) DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()
        "#
    ))
    .bind(id)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .map_err(|e| PurseError::Storage(format!("postgres {table} upsert failed: {e}")))?;

    Ok(())
}

fn get_text(row: &sqlx::postgres::PgRow, column: &str) -> Result<String, PurseError> {
    row.try_get(column)
        .map_err(|e| PurseError::Storage(format!("postgres decode {column} failed: {e}")))
}

fn amount_to_db(amount: Amount) -> Result<i64, PurseError> {
    amount
        .minor()
        .try_into()
        .map_err(|_| PurseError::Storage("amount exceeds postgres BIGINT range".to_string()))
}

fn amount_from_db(value: i64) -> Result<Amount, PurseError> {
    let minor: u64 = value
        .try_into()
        .map_err(|_| PurseError::Storage("negative amount in storage".to_string()))?;
    Ok(Amount::from_minor(minor))
}

fn tier_to_str(tier: &Tier) -> &'static str {
    match tier {
        Tier::Free => "free",
        Tier::Standard => "standard",
        Tier::Premium => "premium",
        Tier::Gold => "gold",
    }
}

fn parse_tier(value: &str) -> Result<Tier, PurseError> {
    match value {
        "free" => Ok(Tier::Free),
        "standard" => Ok(Tier::Standard),
        "premium" => Ok(Tier::Premium),
        "gold" => Ok(Tier::Gold),
        other => Err(PurseError::Storage(format!(
            "unknown tier '{other}' in postgres"
        ))),
    }
}

fn kind_to_str(kind: &EntryKind) -> &'static str {
    match kind {
        EntryKind::Deposit => "deposit",
        EntryKind::Withdrawal => "withdrawal",
        EntryKind::Transfer => "transfer",
        EntryKind::Purchase => "purchase",
        EntryKind::Contribution => "contribution",
    }
}

fn parse_kind(value: &str) -> Result<EntryKind, PurseError> {
    match value {
        "deposit" => Ok(EntryKind::Deposit),
        "withdrawal" => Ok(EntryKind::Withdrawal),
        "transfer" => Ok(EntryKind::Transfer),
        "purchase" => Ok(EntryKind::Purchase),
        "contribution" => Ok(EntryKind::Contribution),
        other => Err(PurseError::Storage(format!(
            "unknown entry kind '{other}' in postgres"
        ))),
    }
}

fn status_to_str(status: &EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "pending",
        EntryStatus::Completed => "completed",
        EntryStatus::Failed => "failed",
    }
}

fn parse_status(value: &str) -> Result<EntryStatus, PurseError> {
    match value {
        "pending" => Ok(EntryStatus::Pending),
        "completed" => Ok(EntryStatus::Completed),
        "failed" => Ok(EntryStatus::Failed),
        other => Err(PurseError::Storage(format!(
            "unknown entry status '{other}' in postgres"
        ))),
    }
}

fn parse_method(value: &str) -> PaymentMethod {
    match value {
        "wallet" => PaymentMethod::Wallet,
        "card" => PaymentMethod::Card,
        "bank_transfer" => PaymentMethod::BankTransfer,
        other => PaymentMethod::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_has_nothing_to_hydrate() {
        let store = StateStore::bootstrap(StorageConfig::memory()).await.unwrap();
        assert_eq!(store.backend_label(), "memory");
        assert!(store.hydrate().await.unwrap().is_none());
    }

    #[test]
    fn kind_string_roundtrip() {
        let kinds = [
            EntryKind::Deposit,
            EntryKind::Withdrawal,
            EntryKind::Transfer,
            EntryKind::Purchase,
            EntryKind::Contribution,
        ];
        for kind in kinds {
            assert_eq!(parse_kind(kind_to_str(&kind)).unwrap(), kind);
        }
    }

    #[test]
    fn status_string_roundtrip() {
        let statuses = [
            EntryStatus::Pending,
            EntryStatus::Completed,
            EntryStatus::Failed,
        ];
        for status in statuses {
            assert_eq!(parse_status(status_to_str(&status)).unwrap(), status);
        }
    }

    #[test]
    fn tier_string_roundtrip() {
        let tiers = [Tier::Free, Tier::Standard, Tier::Premium, Tier::Gold];
        for tier in tiers {
            assert_eq!(parse_tier(tier_to_str(&tier)).unwrap(), tier);
        }
    }

    #[test]
    fn method_parse_keeps_unknown_tags() {
        assert_eq!(parse_method("wallet"), PaymentMethod::Wallet);
        assert_eq!(parse_method("card"), PaymentMethod::Card);
        assert_eq!(
            parse_method("mobile_money"),
            PaymentMethod::Other("mobile_money".to_string())
        );
    }

    #[test]
    fn negative_amounts_are_rejected_on_load() {
        assert!(amount_from_db(-1).is_err());
        assert_eq!(amount_from_db(2_500).unwrap(), Amount::from_minor(2_500));
    }
}
