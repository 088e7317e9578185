//! Built-in toolkits.
//!
//! Small, dependency-free toolkits that ship with the worker. They double
//! as reference tools for the declaration surface: typed parameters,
//! context injection, deprecation, retry hints, batched lookups, and a
//! synchronous store pinned to a blocking lane.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use armature_core::{Behavior, Classification, SystemType, ToolMetadata, Verb, Version};
use armature_runtime::{gather_bounded, BlockingLane, HandleCache, LaneError, PooledHandle};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, ToolCatalog, Toolkit};
use crate::declare::{DeclaredType, StructType, ToolOptions, ToolType};
use crate::error::ToolError;
use crate::function::{Param, Tool, ToolArgs, ToolFunction};

const DIRECTORY_CONCURRENCY: usize = 4;

fn self_contained(verbs: Vec<Verb>, read_only: bool) -> ToolMetadata {
    ToolMetadata::new()
        .with_classification(Classification {
            domains: Vec::new(),
            system_types: vec![SystemType::SelfContained],
        })
        .with_behavior(Behavior {
            verbs,
            read_only: Some(read_only),
            destructive: Some(false),
            idempotent: Some(read_only),
            open_world: Some(false),
        })
}

/// `Greetings@1.0.0`
#[must_use]
pub fn greetings() -> Toolkit {
    let say_hello = ToolFunction::new("say_hello")
        .doc("Say hello to someone by name.")
        .param(Param::new::<String>("name", "The name of the person to greet"))
        .returns::<String>("A greeting")
        .sync_handler(|args| Ok(format!("Hello, {}!", args.get::<String>("name")?)));

    let say_hi = ToolFunction::new("say_hi")
        .doc("Say hi to someone by name.")
        .param(Param::new::<String>("name", "The name of the person to greet"))
        .returns::<String>("A greeting")
        .sync_handler(|args| Ok(format!("Hi, {}!", args.get::<String>("name")?)));

    let fetch_config = ToolFunction::new("fetch_greeting_config")
        .doc("Fetch the greeting configuration for the current account.")
        .context_param("context")
        .returns::<GreetingConfig>("Greeting configuration")
        .sync_handler(|args| {
            let key = args.context()?.get_secret("API_KEY")?;
            Ok(GreetingConfig {
                greeting: "Hello".to_string(),
                api_key_hint: mask(&key),
            })
        });

    Toolkit::new("Greetings", Version::new(1, 0, 0))
        .with_description("Greets people")
        .tool(Tool::new(
            say_hello,
            ToolOptions::new().with_metadata(self_contained(vec![Verb::Read], true)),
        ))
        .tool(Tool::new(
            say_hi,
            ToolOptions::new()
                .deprecated("SayHi is deprecated; use SayHello instead")
                .with_metadata(self_contained(vec![Verb::Read], true)),
        ))
        .tool(Tool::new(
            fetch_config,
            ToolOptions::new()
                .with_secret("API_KEY")
                .with_metadata(self_contained(vec![Verb::Read], true)),
        ))
}

/// Greeting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingConfig {
    /// Greeting word
    pub greeting: String,
    /// Masked API key
    pub api_key_hint: String,
}

impl ToolType for GreetingConfig {
    fn declared_type() -> DeclaredType {
        StructType::new("GreetingConfig")
            .field::<String>("greeting", "Greeting word")
            .field::<String>("api_key_hint", "Last four characters of the API key")
            .into()
    }
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", tail)
    }
}

/// Polygon kinds understood by `Arithmetic.DescribeShape`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    /// Three sides
    Triangle,
    /// Four sides
    Square,
    /// Five sides
    Pentagon,
    /// Six sides
    Hexagon,
}

impl ShapeKind {
    const fn sides(self) -> u32 {
        match self {
            Self::Triangle => 3,
            Self::Square => 4,
            Self::Pentagon => 5,
            Self::Hexagon => 6,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Triangle => "triangle",
            Self::Square => "square",
            Self::Pentagon => "pentagon",
            Self::Hexagon => "hexagon",
        }
    }
}

impl ToolType for ShapeKind {
    fn declared_type() -> DeclaredType {
        DeclaredType::enumeration(["triangle", "square", "pentagon", "hexagon"])
    }
}

/// Shape argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Kind of polygon
    pub kind: ShapeKind,
    /// Claimed number of sides
    pub sides: u32,
}

impl ToolType for Shape {
    fn declared_type() -> DeclaredType {
        StructType::new("Shape")
            .field::<ShapeKind>("kind", "Kind of polygon")
            .field::<u32>("sides", "Number of sides")
            .into()
    }
}

/// `Arithmetic@1.0.0`
#[must_use]
pub fn arithmetic() -> Toolkit {
    let add = ToolFunction::new("add")
        .doc("Add two integers.")
        .param(Param::new::<i64>("a", "First addend"))
        .param(Param::new::<i64>("b", "Second addend"))
        .returns::<i64>("The sum")
        .sync_handler(|args| {
            let a: i64 = args.get("a")?;
            let b: i64 = args.get("b")?;
            a.checked_add(b).ok_or_else(|| {
                ToolError::fatal("The sum does not fit in a 64-bit integer")
            })
        });

    let sum_all = ToolFunction::new("sum_all")
        .doc("Sum a list of numbers.")
        .param(Param::new::<Vec<f64>>("values", "Numbers to sum"))
        .returns::<f64>("The total")
        .sync_handler(|args| Ok(args.get::<Vec<f64>>("values")?.iter().sum::<f64>()));

    let describe_shape = ToolFunction::new("describe_shape")
        .doc("Describe a polygon, checking its side count.")
        .param(Param::new::<Shape>("shape", "The shape to describe"))
        .returns::<String>("A sentence describing the shape")
        .sync_handler(|args| {
            let shape: Shape = args.get("shape")?;
            let expected = shape.kind.sides();
            if shape.sides != expected {
                return Err(ToolError::retry(format!(
                    "A {} does not have {} sides",
                    shape.kind.name(),
                    shape.sides
                ))
                .with_prompt(format!(
                    "A {} has exactly {} sides. Call the tool again with sides={}.",
                    shape.kind.name(),
                    expected,
                    expected
                )));
            }
            Ok(format!("A {} has {} sides", shape.kind.name(), expected))
        });

    let metadata = || self_contained(vec![Verb::Read], true);
    Toolkit::new("Arithmetic", Version::new(1, 0, 0))
        .with_description("Integer and floating point helpers")
        .tool(Tool::new(add, ToolOptions::new().with_metadata(metadata())))
        .tool(Tool::new(sum_all, ToolOptions::new().with_metadata(metadata())))
        .tool(Tool::new(
            describe_shape,
            ToolOptions::new().with_metadata(metadata()),
        ))
}

/// Directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub username: String,
    /// Full name
    pub display_name: String,
}

impl ToolType for User {
    fn declared_type() -> DeclaredType {
        StructType::new("User")
            .field::<String>("username", "Login name")
            .field::<String>("display_name", "Full name")
            .into()
    }
}

/// Outcome of a batched lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLookup {
    /// Users that were found, in request order
    pub found: Vec<User>,
    /// Usernames that were not found, in request order
    pub not_found: Vec<String>,
}

impl ToolType for UserLookup {
    fn declared_type() -> DeclaredType {
        StructType::new("UserLookup")
            .field::<Vec<User>>("found", "Users that were found")
            .field::<Vec<String>>("not_found", "Usernames that were not found")
            .into()
    }
}

const DIRECTORY: &[(&str, &str)] = &[
    ("ada", "Ada Lovelace"),
    ("alan", "Alan Turing"),
    ("grace", "Grace Hopper"),
    ("katherine", "Katherine Johnson"),
    ("linus", "Linus Torvalds"),
];

async fn lookup_user(username: String) -> Result<User, String> {
    tokio::task::yield_now().await;
    let wanted = username.trim().to_lowercase();
    DIRECTORY
        .iter()
        .find(|(login, _)| *login == wanted)
        .map(|(login, name)| User {
            username: (*login).to_string(),
            display_name: (*name).to_string(),
        })
        .ok_or_else(|| format!("no user named '{}'", username))
}

/// `Directory@1.0.0`
#[must_use]
pub fn directory() -> Toolkit {
    let lookup_users = ToolFunction::new("lookup_users")
        .doc("Resolve several usernames to user records at once.")
        .param(Param::new::<Vec<String>>("usernames", "Usernames to resolve"))
        .returns::<UserLookup>("Found users and the usernames that did not resolve")
        .handler(|args: ToolArgs| async move {
            let usernames: Vec<String> = args.get("usernames")?;
            let outcome = gather_bounded(usernames, DIRECTORY_CONCURRENCY, lookup_user).await;
            Ok(UserLookup {
                found: outcome.succeeded.into_iter().map(|(_, user)| user).collect(),
                not_found: outcome.failed.into_iter().map(|(name, _)| name).collect(),
            })
        });

    Toolkit::new("Directory", Version::new(1, 0, 0))
        .with_description("Looks up people in the built-in directory")
        .tool(Tool::new(
            lookup_users,
            ToolOptions::new().with_metadata(self_contained(vec![Verb::Read], true)),
        ))
}

/// Synchronous in-memory ledger engine
///
/// Stands in for an embedded database client: every operation is
/// blocking, so it only ever runs on a [`BlockingLane`].
#[derive(Debug, Default)]
pub struct LedgerEngine {
    balances: Mutex<HashMap<String, i64>>,
    closed: AtomicBool,
}

impl LedgerEngine {
    fn open() -> Self {
        Self::default()
    }

    fn post(&self, account: &str, amount: i64) -> Result<i64, ToolError> {
        let mut balances = self.balances.lock().unwrap_or_else(PoisonError::into_inner);
        let balance = balances.entry(account.to_string()).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| ToolError::fatal("Ledger balance overflowed"))?;
        Ok(*balance)
    }

    fn balance(&self, account: &str) -> i64 {
        self.balances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    /// Mark the engine closed
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PooledHandle for LedgerEngine {
    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn dispose(&self) {
        self.close();
    }
}

/// Shared resources behind the `Ledger` toolkit
pub struct LedgerResources {
    engines: HandleCache<String, LedgerEngine>,
    lane: Arc<BlockingLane>,
}

impl LedgerResources {
    /// Start the ledger lane
    ///
    /// # Errors
    ///
    /// Returns error if the lane thread cannot be spawned
    pub fn new() -> Result<Self, LaneError> {
        Ok(Self {
            engines: HandleCache::new(),
            lane: Arc::new(BlockingLane::new("ledger")?),
        })
    }

    /// Cached engine for `ledger`, reopened if it was closed
    #[must_use]
    pub fn engine(&self, ledger: &str) -> Arc<LedgerEngine> {
        let opened: Result<_, std::convert::Infallible> =
            self.engines.get_or_create(&ledger.to_string(), |_| Ok(LedgerEngine::open()));
        match opened {
            Ok(engine) => engine,
            Err(never) => match never {},
        }
    }

    /// Engine cache
    #[must_use]
    pub fn engines(&self) -> &HandleCache<String, LedgerEngine> {
        &self.engines
    }

    /// Drain the lane for up to `grace`, then dispose cached engines;
    /// returns how many engines were disposed
    pub async fn dispose(&self, grace: Duration) -> usize {
        self.lane.shutdown(grace).await;
        self.engines.dispose_all()
    }

    /// Close the lane without waiting and dispose cached engines
    pub fn close(&self) -> usize {
        self.lane.close();
        self.engines.dispose_all()
    }
}

impl std::fmt::Debug for LedgerResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerResources")
            .field("engines", &self.engines.len())
            .field("lane", &self.lane.name())
            .finish()
    }
}

/// `Ledger@1.0.0`
#[must_use]
pub fn ledger(resources: &Arc<LedgerResources>) -> Toolkit {
    let ledger_param = || Param::new::<String>("ledger", "Ledger name").with_default("main");

    let post_resources = Arc::clone(resources);
    let record_entry = ToolFunction::new("record_entry")
        .doc("Post an amount to an account and return the new balance.")
        .param(Param::new::<String>("account", "Account name"))
        .param(Param::new::<i64>("amount", "Amount in cents; negative for debits"))
        .param(ledger_param())
        .returns::<i64>("New balance in cents")
        .lane_handler(Arc::clone(&resources.lane), move |args| {
            let ledger: String = args.get("ledger")?;
            let account: String = args.get("account")?;
            let amount: i64 = args.get("amount")?;
            post_resources.engine(&ledger).post(&account, amount)
        });

    let read_resources = Arc::clone(resources);
    let get_balance = ToolFunction::new("get_balance")
        .doc("Read an account balance.")
        .param(Param::new::<String>("account", "Account name"))
        .param(ledger_param())
        .returns::<i64>("Balance in cents")
        .lane_handler(Arc::clone(&resources.lane), move |args| {
            let ledger: String = args.get("ledger")?;
            let account: String = args.get("account")?;
            Ok(read_resources.engine(&ledger).balance(&account))
        });

    Toolkit::new("Ledger", Version::new(1, 0, 0))
        .with_description("Posts and reads balances in a synchronous ledger")
        .tool(Tool::new(
            record_entry,
            ToolOptions::new().with_metadata(self_contained(vec![Verb::Create], false)),
        ))
        .tool(Tool::new(
            get_balance,
            ToolOptions::new().with_metadata(self_contained(vec![Verb::Read], true)),
        ))
}

/// Register every built-in toolkit
///
/// # Errors
///
/// Returns error if any toolkit fails to register
pub fn register_builtins(
    catalog: &mut ToolCatalog,
    ledger_resources: &Arc<LedgerResources>,
) -> Result<usize, CatalogError> {
    let mut count = 0;
    for toolkit in [greetings(), arithmetic(), directory(), ledger(ledger_resources)] {
        count += catalog.add_toolkit(toolkit)?;
    }
    Ok(count)
}
