//! Integration test: randomized operation sequences preserve escrow
//! conservation and total supply.
//!
//! Seeded so failures reproduce. Invalid operations are expected; they must
//! fail without moving anything.

use std::sync::Arc;

use chrono::{Duration, Utc};
use escrowmatch_engine::{Exchange, LedgerRegistry};
use escrowmatch_types::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

const ACCOUNTS: usize = 6;
const STEPS: usize = 400;

struct World {
    exchange: Exchange,
    prop: Arc<InMemoryLedger>,
    usdc: Arc<InMemoryLedger>,
    clock: Arc<ManualClock>,
    accounts: Vec<AccountId>,
    engine: AccountId,
    fee_receiver: AccountId,
    manager: AccountId,
}

fn world() -> World {
    let prop = Arc::new(InMemoryLedger::new("PROP"));
    let usdc = Arc::new(InMemoryLedger::new("USDC"));
    let (engine, fee_receiver, manager) = (AccountId::new(), AccountId::new(), AccountId::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let exchange = Exchange::new(
        EngineConfig::new(engine, "USDC", fee_receiver),
        Arc::new(StaticRoleRegistry::new().with(Role::Manager, manager))
            as Arc<dyn AuthorizationGateway>,
        LedgerRegistry::new()
            .with(Arc::clone(&prop) as Arc<dyn FungibleLedger>)
            .with(Arc::clone(&usdc) as Arc<dyn FungibleLedger>),
        Arc::clone(&clock) as Arc<dyn Clock>,
    )
    .unwrap();

    let accounts: Vec<AccountId> = (0..ACCOUNTS).map(|_| AccountId::new()).collect();
    for account in &accounts {
        prop.mint(*account, dec(5_000));
        usdc.mint(*account, dec(50_000));
        prop.approve(*account, engine, dec(1_000_000));
        usdc.approve(*account, engine, dec(1_000_000));
    }
    World {
        exchange,
        prop,
        usdc,
        clock,
        accounts,
        engine,
        fee_receiver,
        manager,
    }
}

fn run(seed: u64) {
    let w = world();
    let mut rng = StdRng::seed_from_u64(seed);
    let asset = AssetHandle::from("PROP");
    let prop_supply = w.prop.total_supply();
    let usdc_supply = w.usdc.total_supply();
    let mut created: Vec<OrderId> = Vec::new();

    for step in 0..STEPS {
        let who = w.accounts[rng.gen_range(0..ACCOUNTS)];
        let amount = dec(rng.gen_range(1..=200));
        let price = dec(rng.gen_range(1..=20));
        let before = (w.prop.balance_of(&w.engine), w.usdc.balance_of(&w.engine));

        let outcome = match rng.gen_range(0..7) {
            0 => w.exchange.create_sell_order(who, &asset, amount, price).map(|id| {
                created.push(id);
            }),
            1 => w.exchange.create_buy_order(who, &asset, amount, price).map(|id| {
                created.push(id);
            }),
            2 | 3 if !created.is_empty() => {
                let id = created[rng.gen_range(0..created.len())];
                w.exchange.buy_order(who, id).map(|_| ())
            }
            4 if !created.is_empty() => {
                let id = created[rng.gen_range(0..created.len())];
                w.exchange.sell_order(who, id).map(|_| ())
            }
            5 if !created.is_empty() => {
                let id = created[rng.gen_range(0..created.len())];
                w.exchange.cancel_order(who, id)
            }
            6 => w
                .exchange
                .set_fee_rate(w.manager, rng.gen_range(0..=1_000)),
            _ => Ok(()),
        };

        if outcome.is_err() {
            let after = (w.prop.balance_of(&w.engine), w.usdc.balance_of(&w.engine));
            assert_eq!(before, after, "seed {seed} step {step}: failed op moved custody");
        }
        w.clock.advance(Duration::seconds(rng.gen_range(0..90)));

        if let Err(err) = w.exchange.verify_conservation() {
            panic!("seed {seed} step {step}: {err}");
        }
        assert_eq!(w.prop.total_supply(), prop_supply);
        assert_eq!(w.usdc.total_supply(), usdc_supply);
    }

    // Cancel everything still open: custody must drain to zero.
    for side in [OrderSide::Sell, OrderSide::Buy] {
        for id in w.exchange.get_active_orders(side) {
            let creator = w.exchange.get_order(id).unwrap().creator;
            w.exchange.cancel_order(creator, id).unwrap();
        }
    }
    assert_eq!(w.prop.balance_of(&w.engine), Decimal::ZERO);
    assert_eq!(w.usdc.balance_of(&w.engine), Decimal::ZERO);
    assert_eq!(w.exchange.custody_balance(&asset), Decimal::ZERO);

    let fees = w.usdc.balance_of(&w.fee_receiver);
    let traders: Decimal = w.accounts.iter().map(|a| w.usdc.balance_of(a)).sum();
    assert_eq!(traders + fees, usdc_supply);
}

#[test]
fn random_sequences_conserve_escrow() {
    for seed in [1, 7, 42, 1_234, 99_999] {
        run(seed);
    }
}
