use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use corral::PoolConfig;

/// Which scenario(s) the binary runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Concurrent orders locking random item sets.
    Inventory,
    /// Paced submissions into an eager-growing pool.
    Pool,
    /// Both, inventory first.
    All,
}

/// Runtime configuration for the `corral-demo` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults that reproduce the classic
/// shapes: 10 items × 1000 units with 100 orders of 3 items, and a pool with
/// 2 core workers, 5 maximum and room for 10 queued tasks.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "corral-demo",
    version,
    about = "Exercises the corral worker pool and ordered lock manager"
)]
pub struct CliArgs {
    /// Scenario to run.
    ///
    /// Environment variable: `CORRAL_SCENARIO`
    #[arg(long, env = "CORRAL_SCENARIO", value_enum, default_value_t = Scenario::All)]
    pub scenario: Scenario,

    /// Number of distinct items in the inventory.
    ///
    /// Environment variable: `CORRAL_ITEMS`
    #[arg(long, env = "CORRAL_ITEMS", default_value_t = 10)]
    pub items: usize,

    /// Units initially in stock for every item.
    ///
    /// Environment variable: `CORRAL_STOCK`
    #[arg(long, env = "CORRAL_STOCK", default_value_t = 1000)]
    pub stock: u64,

    /// Orders placed concurrently, one thread each.
    ///
    /// Environment variable: `CORRAL_ORDERS`
    #[arg(long, env = "CORRAL_ORDERS", default_value_t = 100)]
    pub orders: usize,

    /// Items drawn (with repetition) into every cart.
    ///
    /// Environment variable: `CORRAL_CART_SIZE`
    #[arg(long, env = "CORRAL_CART_SIZE", default_value_t = 3)]
    pub cart_size: usize,

    /// How long an order waits for each item lock, in milliseconds.
    ///
    /// Caller-ordered acquisition relies on this timeout to break deadlocks,
    /// so large values make that half of the scenario slow.
    ///
    /// Environment variable: `CORRAL_LOCK_TIMEOUT_MS`
    #[arg(long, env = "CORRAL_LOCK_TIMEOUT_MS", default_value_t = 1000)]
    pub lock_timeout_ms: u64,

    /// Workers kept alive while idle.
    ///
    /// Environment variable: `CORRAL_CORE_SIZE`
    #[arg(long, env = "CORRAL_CORE_SIZE", default_value_t = 2)]
    pub core_size: usize,

    /// Ceiling on live workers.
    ///
    /// Environment variable: `CORRAL_MAX_SIZE`
    #[arg(long, env = "CORRAL_MAX_SIZE", default_value_t = 5)]
    pub max_size: usize,

    /// Seconds an idle worker waits for work before retiring.
    ///
    /// Environment variable: `CORRAL_KEEP_ALIVE_SECS`
    #[arg(long, env = "CORRAL_KEEP_ALIVE_SECS", default_value_t = 5)]
    pub keep_alive_secs: u64,

    /// Tasks the queue holds once every worker is busy.
    ///
    /// Environment variable: `CORRAL_QUEUE_CAPACITY`
    #[arg(long, env = "CORRAL_QUEUE_CAPACITY", default_value_t = 10)]
    pub queue_capacity: usize,

    /// Give up on a saturated submission after this many milliseconds.
    /// Unset blocks until space frees up.
    ///
    /// Environment variable: `CORRAL_ADMISSION_TIMEOUT_MS`
    #[arg(long, env = "CORRAL_ADMISSION_TIMEOUT_MS")]
    pub admission_timeout_ms: Option<u64>,

    /// Tasks submitted in the pool scenario.
    ///
    /// Environment variable: `CORRAL_TASKS`
    #[arg(long, env = "CORRAL_TASKS", default_value_t = 20)]
    pub tasks: usize,

    /// How long every pool task runs, in milliseconds.
    ///
    /// Environment variable: `CORRAL_TASK_MS`
    #[arg(long, env = "CORRAL_TASK_MS", default_value_t = 2000)]
    pub task_ms: u64,

    /// Pause between two submissions, in milliseconds.
    ///
    /// Environment variable: `CORRAL_SUBMIT_INTERVAL_MS`
    #[arg(long, env = "CORRAL_SUBMIT_INTERVAL_MS", default_value_t = 200)]
    pub submit_interval_ms: u64,

    /// Period of the pool statistics monitor, in milliseconds.
    ///
    /// Environment variable: `CORRAL_STATS_INTERVAL_MS`
    #[arg(long, env = "CORRAL_STATS_INTERVAL_MS", default_value_t = 500)]
    pub stats_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct InventoryConfig {
    pub items: usize,
    pub stock: u64,
    pub orders: usize,
    pub cart_size: usize,
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub pool: PoolConfig,
    pub tasks: usize,
    pub task_duration: Duration,
    pub submit_interval: Duration,
    pub stats_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub scenario: Scenario,
    pub inventory: InventoryConfig,
    pub load: LoadConfig,
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.items == 0 {
            bail!("CORRAL_ITEMS must be greater than 0");
        }
        if args.cart_size == 0 {
            bail!("CORRAL_CART_SIZE must be greater than 0");
        }
        if args.stats_interval_ms == 0 {
            bail!("CORRAL_STATS_INTERVAL_MS must be greater than 0");
        }

        let pool = PoolConfig::new(
            args.core_size,
            args.max_size,
            Duration::from_secs(args.keep_alive_secs),
            args.queue_capacity,
        )
        .prestart(true)
        .allow_core_timeout(args.keep_alive_secs > 0)
        .admission_timeout(args.admission_timeout_ms.map(Duration::from_millis))
        .thread_name("demo-pool");
        pool.validate()?;

        Ok(Self {
            scenario: args.scenario,
            inventory: InventoryConfig {
                items: args.items,
                stock: args.stock,
                orders: args.orders,
                cart_size: args.cart_size,
                lock_timeout: Duration::from_millis(args.lock_timeout_ms),
            },
            load: LoadConfig {
                pool,
                tasks: args.tasks,
                task_duration: Duration::from_millis(args.task_ms),
                submit_interval: Duration::from_millis(args.submit_interval_ms),
                stats_interval: Duration::from_millis(args.stats_interval_ms),
            },
        })
    }
}
