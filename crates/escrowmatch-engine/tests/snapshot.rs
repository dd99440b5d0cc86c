//! Integration test: snapshot to disk and restore.

use std::sync::Arc;

use chrono::{Duration, Utc};
use escrowmatch_engine::{EngineSnapshot, Exchange, LedgerRegistry, SnapshotStore};
use escrowmatch_types::*;
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn prop() -> AssetHandle {
    AssetHandle::from("PROP")
}

struct Env {
    prop: Arc<InMemoryLedger>,
    usdc: Arc<InMemoryLedger>,
    roles: Arc<StaticRoleRegistry>,
    clock: Arc<ManualClock>,
    engine: AccountId,
    admin: AccountId,
    manager: AccountId,
}

impl Env {
    fn new() -> Self {
        let (admin, manager) = (AccountId::new(), AccountId::new());
        Self {
            prop: Arc::new(InMemoryLedger::new("PROP")),
            usdc: Arc::new(InMemoryLedger::new("USDC")),
            roles: Arc::new(
                StaticRoleRegistry::new()
                    .with(Role::Admin, admin)
                    .with(Role::Admin, AccountId::new())
                    .with(Role::Manager, manager),
            ),
            clock: Arc::new(ManualClock::new(Utc::now())),
            engine: AccountId::new(),
            admin,
            manager,
        }
    }

    fn ledgers(&self) -> LedgerRegistry {
        LedgerRegistry::new()
            .with(Arc::clone(&self.prop) as Arc<dyn FungibleLedger>)
            .with(Arc::clone(&self.usdc) as Arc<dyn FungibleLedger>)
    }

    fn gateway(&self) -> Arc<dyn AuthorizationGateway> {
        Arc::clone(&self.roles) as Arc<dyn AuthorizationGateway>
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock) as Arc<dyn Clock>
    }

    fn exchange(&self) -> Exchange {
        Exchange::new(
            EngineConfig::new(self.engine, "USDC", AccountId::new()),
            self.gateway(),
            self.ledgers(),
            self.clock(),
        )
        .unwrap()
    }

    fn restore(&self, snapshot: EngineSnapshot) -> Exchange {
        Exchange::restore(snapshot, self.gateway(), self.ledgers(), self.clock()).unwrap()
    }

    fn account(&self, units: i64, cash: i64) -> AccountId {
        let who = AccountId::new();
        self.prop.mint(who, dec(units));
        self.prop.approve(who, self.engine, dec(units));
        self.usdc.mint(who, dec(cash));
        self.usdc.approve(who, self.engine, dec(cash));
        who
    }
}

#[test]
fn restore_continues_where_snapshot_left_off() {
    let env = Env::new();
    let exchange = env.exchange();
    let alice = env.account(300, 0);
    let bob = env.account(0, 1_000);

    let filled = exchange.create_sell_order(alice, &prop(), dec(100), dec(2)).unwrap();
    let open = exchange.create_sell_order(alice, &prop(), dec(100), dec(2)).unwrap();
    let bid = exchange.create_buy_order(bob, &prop(), dec(10), dec(5)).unwrap();
    exchange.buy_order(bob, filled).unwrap();
    exchange.set_fee_rate(env.manager, 100).unwrap();
    let carol = AccountId::new();
    exchange.set_blacklist_status(env.manager, carol, true).unwrap();
    exchange.initiate_emergency_withdrawal(env.admin).unwrap();
    exchange.pause(env.admin).unwrap();
    let last_sequence = exchange.events().last().unwrap().sequence;

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let path = store.save(&exchange.snapshot().unwrap()).unwrap();
    assert!(path.ends_with(format!("snapshot-{last_sequence:012}.json")));
    drop(exchange);

    let restored = env.restore(store.load_latest().unwrap().unwrap());
    assert!(restored.is_paused());
    assert_eq!(restored.get_config().fee_rate_bps, 100);
    assert_eq!(restored.get_order(filled).unwrap().status, OrderStatus::Filled);
    assert_eq!(restored.get_active_orders(OrderSide::Sell), vec![open]);
    assert_eq!(restored.get_active_orders(OrderSide::Buy), vec![bid]);
    assert_eq!(restored.get_user_orders(&alice), vec![filled, open]);
    assert_eq!(restored.custody_balance(&prop()), dec(100));
    assert_eq!(
        restored.get_account_state(&bob).last_trade_at,
        Some(env.clock.now())
    );
    assert_eq!(restored.get_governance_request().unwrap().approval_count(), 1);
    assert!(restored.get_account_state(&carol).blacklisted);
    restored.verify_conservation().unwrap();

    restored.unpause(env.admin).unwrap();
    assert_eq!(restored.events()[0].sequence, last_sequence + 1);

    let next = restored.create_sell_order(alice, &prop(), dec(100), dec(3)).unwrap();
    assert_eq!(next, OrderId(4));
    restored.cancel_order(alice, open).unwrap();
    env.clock.advance(Duration::minutes(1));
    restored.sell_order(env.account(10, 0), bid).unwrap();
    restored.verify_conservation().unwrap();
}

#[test]
fn tampered_file_is_rejected() {
    let env = Env::new();
    let exchange = env.exchange();
    let alice = env.account(100, 0);
    exchange.create_sell_order(alice, &prop(), dec(100), dec(2)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let path = store.save(&exchange.snapshot().unwrap()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let tampered = text.replacen("\"paused\": false", "\"paused\": true", 1);
    assert_ne!(text, tampered);
    std::fs::write(&path, tampered).unwrap();

    assert!(matches!(
        store.load(&path).unwrap_err(),
        EscrowMatchError::Serialization(_)
    ));
}

#[test]
fn inconsistent_escrow_is_rejected() {
    let env = Env::new();
    let exchange = env.exchange();
    let alice = env.account(100, 0);
    exchange.create_sell_order(alice, &prop(), dec(100), dec(2)).unwrap();

    let mut snapshot = exchange.snapshot().unwrap();
    snapshot.state.escrow_records.clear();
    let snapshot = EngineSnapshot::new(snapshot.state, snapshot.taken_at).unwrap();
    let result = Exchange::restore(snapshot, env.gateway(), env.ledgers(), env.clock());
    assert!(matches!(
        result.err().unwrap(),
        EscrowMatchError::EscrowInvariantViolation { .. }
    ));
}

#[test]
fn missing_payment_ledger_is_rejected() {
    let env = Env::new();
    let snapshot = env.exchange().snapshot().unwrap();
    let only_prop = LedgerRegistry::new().with(Arc::clone(&env.prop) as Arc<dyn FungibleLedger>);
    let result = Exchange::restore(snapshot, env.gateway(), only_prop, env.clock());
    assert!(matches!(
        result.err().unwrap(),
        EscrowMatchError::Configuration(_)
    ));
}
