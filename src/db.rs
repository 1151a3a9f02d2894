use crate::config::DatabaseConfig;
use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rand::Rng;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Read-only access to the `words(word text, winning boolean)` table.
///
/// HTTP handlers are generic over this trait; production uses [`Database`].
#[trait_variant::make(WordStore: Send)]
pub trait LocalWordStore {
    /// A word drawn uniformly from the rows marked `winning`.
    async fn random_word(&self) -> ApiResult<String>;

    /// Exact, case-sensitive match against the dictionary.
    async fn word_exists(&self, word: &str) -> ApiResult<bool>;

    /// Releases the underlying connections. Called once the server has drained.
    async fn close(&self);
}

/// PostgreSQL への接続プールを握るリポジトリ層。
/// 起動時に一度だけ構築し、`Arc` でハンドラに共有する。
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    winning_count: Arc<WinningCountCache>,
}

/// 当選語の件数キャッシュ。0 は「未取得」を兼ねるので、
/// 空のテーブルを数えた結果は保持せず次回に数え直す。
#[derive(Debug, Default)]
pub struct WinningCountCache(AtomicI64);

impl WinningCountCache {
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> ApiResult<i64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<i64>>,
    {
        let cached = self.0.load(Ordering::Acquire);
        if cached > 0 {
            return Ok(cached);
        }

        let count = fetch().await?;
        if count > 0 {
            self.0.store(count, Ordering::Release);
            info!("Cached winning word count: {}", count);
        }
        Ok(count)
    }
}

/// Tick of the idle reaper; half the idle timeout so a connection is
/// never kept much past its limit.
fn reaper_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(Duration::from_millis(1))
}

impl Database {
    /// 接続プールを構築し、疎通確認を行う。
    /// 疎通に失敗しても起動は続行し、リクエスト単位で 500 を返す。
    pub async fn new(config: DatabaseConfig) -> Result<Self, ApiError> {
        info!(
            "Creating PostgreSQL connection pool (max {} connections)",
            config.max_connections
        );

        let idle_timeout = config.idle_timeout;
        let pool = Self::create_pool(config)?;

        let db = Database {
            pool,
            winning_count: Arc::new(WinningCountCache::default()),
        };

        if let Err(e) = db.test_connection().await {
            warn!("Database is not reachable yet, continuing startup: {}", e);
        }

        db.spawn_idle_reaper(idle_timeout);

        Ok(db)
    }

    /// Deadpool 用の `Config` を URL から組み立てる。
    /// SSL モードは URL の `sslmode` パラメータに従う。
    fn create_pool(config: DatabaseConfig) -> Result<Pool, ApiError> {
        let mut pg_config = Config::new();
        pg_config.url = Some(config.url);

        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(config.max_connections);
        pool_config.timeouts.wait = Some(config.connection_timeout);
        pool_config.timeouts.create = Some(config.connection_timeout);
        pg_config.pool = Some(pool_config);

        let tls_connector = TlsConnector::builder()
            .build()
            .map_err(|e| {
                error!("Failed to create TLS connector: {}", e);
                ApiError::Configuration(format!("TLS connector creation failed: {}", e))
            })?;
        let tls = MakeTlsConnector::new(tls_connector);

        pg_config.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| {
                error!("Failed to create connection pool: {}", e);
                ApiError::Configuration(format!("Connection pool creation failed: {}", e))
            })
    }

    /// Evicts pooled connections that have been idle longer than `idle_timeout`.
    /// The task ends on its own once the pool is closed.
    fn spawn_idle_reaper(&self, idle_timeout: Duration) {
        let pool = self.pool.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper_period(idle_timeout));
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                pool.retain(|_, metrics| metrics.last_used() < idle_timeout);
            }
        });
    }

    /// プールから接続を借りる小さなラッパー。
    async fn get_connection(&self) -> Result<Object, ApiError> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// `SELECT 1` で疎通確認する。
    pub async fn test_connection(&self) -> Result<(), ApiError> {
        let client = self.get_connection().await?;

        client.execute("SELECT 1", &[])
            .await
            .map_err(ApiError::from)?;

        info!("Database connection established");
        Ok(())
    }

    /// 当選語の件数。1 件以上あればプロセス内でキャッシュする。
    async fn winning_words_count(&self) -> Result<i64, ApiError> {
        self.winning_count
            .get_or_fetch(|| async {
                let client = self.get_connection().await?;
                let row = client
                    .query_one("SELECT COUNT(*) FROM words WHERE winning = true", &[])
                    .await
                    .map_err(ApiError::from)?;
                Ok::<i64, ApiError>(row.get(0))
            })
            .await
    }

    /// 当選語から一様に 1 件選ぶ。
    /// `ORDER BY word` で並びを固定し、その上でランダムなオフセットを引く。
    pub async fn get_random_word(&self) -> Result<String, ApiError> {
        let count = self.winning_words_count().await?;
        let offset = random_offset(count, &mut rand::thread_rng())
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("No winning words available")))?;

        let client = self.get_connection().await?;
        let query = "SELECT word FROM words WHERE winning = true ORDER BY word OFFSET $1 LIMIT 1";

        let row = client.query_opt(query, &[&offset])
            .await
            .map_err(ApiError::from)?;

        match row {
            Some(row) => Ok(row.get(0)),
            None => Err(ApiError::query(format!(
                "No winning word at offset {} (cached count {})",
                offset, count
            ))),
        }
    }

    /// 完全一致で単語の存在を確認する。正規化は呼び出し側の責務。
    pub async fn check_word(&self, word: &str) -> Result<bool, ApiError> {
        let client = self.get_connection().await?;
        let query = "SELECT EXISTS (SELECT 1 FROM words WHERE word = $1)";

        let row = client.query_one(query, &[&word])
            .await
            .map_err(ApiError::from)?;

        Ok(row.get(0))
    }

    /// Closes the pool. Safe to call more than once.
    pub fn close_pool(&self) {
        if self.pool.is_closed() {
            return;
        }

        self.pool.close();
        info!("Database connection closed");
    }
}

impl WordStore for Database {
    async fn random_word(&self) -> ApiResult<String> {
        self.get_random_word().await
    }

    async fn word_exists(&self, word: &str) -> ApiResult<bool> {
        self.check_word(word).await
    }

    async fn close(&self) {
        self.close_pool();
    }
}

/// Uniform offset in `[0, count)`, or `None` when there is nothing to pick.
pub fn random_offset<R: Rng>(count: i64, rng: &mut R) -> Option<i64> {
    (count > 0).then(|| rng.gen_range(0..count))
}
