//! deadpool-postgres backed [`ConnectionPool`].

use crate::config::DbConfig;
use crate::error::{OrmError, OrmResult};
use crate::executor::{Connection, ConnectionPool};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, PoolBuilder, RecyclingMethod, Status};
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::{NoTls, Row, Socket};

const POOL_TARGET: &str = "pgmodel.pool";

/// Build a deadpool pool from driver settings with a custom TLS connector.
///
/// Use this when you need to tune pool settings (timeouts, recycling strategy,
/// max size, etc.) beyond what [`DbConfig`] exposes.
pub fn create_pool_with_manager_config<T>(
    pg_config: tokio_postgres::Config,
    tls: T,
    manager_config: ManagerConfig,
    configure_pool: impl FnOnce(PoolBuilder) -> PoolBuilder,
) -> OrmResult<Pool>
where
    T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
    T::Stream: Sync + Send,
    T::TlsConnect: Sync + Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let mgr = Manager::from_config(pg_config, tls, manager_config);
    configure_pool(Pool::builder(mgr))
        .build()
        .map_err(|e| OrmError::Config(format!("failed to build pool: {e}")))
}

fn default_manager_config() -> ManagerConfig {
    ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    }
}

/// A pool of PostgreSQL connections with a bounded acquisition wait.
///
/// Create one at startup with [`PgPool::connect`] and pass it (or a
/// [`Database`](crate::Database) wrapping it) to whatever needs it; call
/// [`PgPool::close`] on shutdown. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("status", &self.pool.status())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl PgPool {
    /// Build the pool without opening any connection.
    pub fn from_config(config: &DbConfig) -> OrmResult<Self> {
        Self::from_config_with_tls(config, NoTls)
    }

    /// Build the pool with a TLS connector, without opening any connection.
    pub fn from_config_with_tls<T>(config: &DbConfig, tls: T) -> OrmResult<Self>
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        config.validate()?;
        let pool = create_pool_with_manager_config(
            config.pg_config()?,
            tls,
            default_manager_config(),
            |builder| builder.max_size(config.pool_size),
        )?;
        Ok(Self::from_pool(pool, config.connect_timeout()))
    }

    /// Wrap an existing deadpool pool.
    pub fn from_pool(pool: Pool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    /// Build the pool and verify that one connection can be established.
    pub async fn connect(config: &DbConfig) -> OrmResult<Self> {
        let pool = Self::from_config(config)?;
        let mut conn = pool.acquire().await.inspect_err(|e| {
            tracing::error!(
                target: POOL_TARGET,
                error = %e,
                "failed to initialize connection pool"
            );
        })?;
        conn.batch_execute("SELECT 1").await?;
        conn.release();
        tracing::info!(
            target: POOL_TARGET,
            max_size = config.pool_size,
            "connection pool initialized"
        );
        Ok(pool)
    }

    /// Close the pool. Checked-out connections are dropped when returned.
    pub fn close(&self) {
        self.pool.close();
        tracing::info!(target: POOL_TARGET, "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn status(&self) -> Status {
        self.pool.status()
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// The underlying deadpool pool.
    pub fn inner(&self) -> &Pool {
        &self.pool
    }
}

impl ConnectionPool for PgPool {
    type Conn = PgConnection;

    async fn acquire(&self) -> OrmResult<PgConnection> {
        match tokio::time::timeout(self.acquire_timeout, self.pool.get()).await {
            Ok(Ok(object)) => Ok(PgConnection(object)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(OrmError::acquisition_timeout(self.acquire_timeout)),
        }
    }
}

/// A connection checked out of a [`PgPool`].
pub struct PgConnection(Object);

impl Connection for PgConnection {
    async fn query(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        self.0
            .query(sql, params)
            .await
            .map_err(|e| OrmError::execution(sql, e))
    }

    async fn batch_execute(&mut self, sql: &str) -> OrmResult<()> {
        self.0
            .batch_execute(sql)
            .await
            .map_err(|e| OrmError::execution(sql, e))
    }

    fn discard(self) {
        // Detach from the pool; dropping the client closes the session.
        drop(Object::take(self.0));
    }
}
