//! Driver-level scenario tests exercising the full runtime surface the way
//! a simulation crate would: a small farm world with growing crops, a
//! scheduled well, event cascades, and save/reload.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use sim_core::{
    AttrError, AttrValue, Attrs, Context, Entity, EntityRegistry, Group, Propagation, Sim,
};

/// Grows a little every step and announces once when ready.
struct Crop {
    growth: f64,
    rate: f64,
    announced: bool,
}

impl Crop {
    fn new(rate: f64) -> Self {
        Self {
            growth: 0.0,
            rate,
            announced: false,
        }
    }
}

impl Entity for Crop {
    fn type_name(&self) -> &'static str {
        "Crop"
    }

    fn update(&mut self, ctx: &mut Context<'_>, dt: f64) {
        self.growth += self.rate * dt;
        if !self.announced && self.growth >= 1.0 {
            self.announced = true;
            ctx.emit(
                "harvest-ready",
                Attrs::new().with("growth", self.growth),
                Propagation::Up,
            );
        }
    }

    fn attributes(&self) -> Attrs {
        Attrs::new()
            .with("growth", self.growth)
            .with("rate", self.rate)
            .with("announced", self.announced)
    }

    fn set_attribute(&mut self, key: &str, value: &AttrValue) -> Result<(), AttrError> {
        match key {
            "growth" => self.growth = expect_f64(key, value)?,
            "rate" => self.rate = expect_f64(key, value)?,
            "announced" => {
                self.announced = value
                    .as_bool()
                    .ok_or_else(|| AttrError::new(key, "expected a bool"))?;
            }
            _ => return Err(AttrError::new(key, "unknown attribute")),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Accumulates water on its own cadence instead of every step.
struct Well {
    water: f64,
    interval: f64,
}

impl Entity for Well {
    fn type_name(&self) -> &'static str {
        "Well"
    }

    fn update(&mut self, _ctx: &mut Context<'_>, dt: f64) {
        self.water += dt;
    }

    fn attributes(&self) -> Attrs {
        Attrs::new()
            .with("water", self.water)
            .with("interval", self.interval)
    }

    fn set_attribute(&mut self, key: &str, value: &AttrValue) -> Result<(), AttrError> {
        match key {
            "water" => self.water = expect_f64(key, value)?,
            "interval" => self.interval = expect_f64(key, value)?,
            _ => return Err(AttrError::new(key, "unknown attribute")),
        }
        Ok(())
    }

    fn on_restore(&mut self, ctx: &mut Context<'_>) {
        let node = ctx.node();
        ctx.schedule(node, self.interval).unwrap();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn expect_f64(key: &str, value: &AttrValue) -> Result<f64, AttrError> {
    value
        .as_f64()
        .ok_or_else(|| AttrError::new(key, "expected a number"))
}

struct FarmRegistry {
    factories: HashMap<&'static str, fn() -> Box<dyn Entity>>,
}

impl FarmRegistry {
    fn new() -> Self {
        let mut factories: HashMap<&'static str, fn() -> Box<dyn Entity>> = HashMap::new();
        factories.insert("Group", || Box::new(Group));
        factories.insert("Crop", || Box::new(Crop::new(0.0)));
        factories.insert("Well", || {
            Box::new(Well {
                water: 0.0,
                interval: 1.0,
            })
        });
        Self { factories }
    }
}

impl EntityRegistry for FarmRegistry {
    fn create(&self, type_name: &str) -> Option<Box<dyn Entity>> {
        self.factories.get(type_name).map(|f| f())
    }
}

struct Farm {
    sim: Sim,
    world: sim_core::NodeId,
    field: sim_core::NodeId,
    fast_crop: sim_core::NodeId,
    slow_crop: sim_core::NodeId,
    well: sim_core::NodeId,
}

fn build_farm() -> Farm {
    let mut sim = Sim::new();
    let world = sim.spawn("world", Group);
    let field = sim.spawn("field", Group);
    let fast_crop = sim.spawn("wheat", Crop::new(0.5));
    let slow_crop = sim.spawn("carrot", Crop::new(0.1));
    let well = sim.spawn(
        "well",
        Well {
            water: 0.0,
            interval: 2.0,
        },
    );
    sim.add_child(world, field).unwrap();
    sim.add_child(field, fast_crop).unwrap();
    sim.add_child(field, slow_crop).unwrap();
    sim.add_child(world, well).unwrap();
    sim.schedule(well, 2.0).unwrap();
    Farm {
        sim,
        world,
        field,
        fast_crop,
        slow_crop,
        well,
    }
}

#[test]
fn steps_drive_growth_events_and_scheduled_cadence() {
    let mut farm = build_farm();
    let harvests = Rc::new(Cell::new(0u32));
    let h = harvests.clone();
    farm.sim
        .on(farm.world, "harvest-ready", 0, move |_ctx, event| {
            assert!(event.payload.get("growth").is_some());
            h.set(h.get() + 1);
            Ok(())
        })
        .unwrap();

    for _ in 0..3 {
        farm.sim.step(farm.world, 0.7).unwrap();
    }

    // The fast crop crossed 1.0 on the third step; the slow one did not.
    assert_eq!(harvests.get(), 1);
    let fast: &Crop = farm.sim.graph().entity(farm.fast_crop).unwrap();
    assert!((fast.growth - 1.05).abs() < 1e-9);
    let slow: &Crop = farm.sim.graph().entity(farm.slow_crop).unwrap();
    assert!(!slow.announced);

    // The well is scheduler-owned: untouched by the per-step traversal,
    // updated exactly once with the full accrued 2.1 seconds.
    let well: &Well = farm.sim.graph().entity(farm.well).unwrap();
    assert!((well.water - 2.1).abs() < 1e-9);

    assert!((farm.sim.now() - 2.1).abs() < 1e-9);
}

#[test]
fn handlers_may_rewire_the_tree_and_defer_events_mid_dispatch() {
    let mut farm = build_farm();
    let celebrations = Rc::new(Cell::new(0u32));

    let c = celebrations.clone();
    farm.sim
        .on(farm.world, "celebrate", 0, move |_ctx, _event| {
            c.set(c.get() + 1);
            Ok(())
        })
        .unwrap();

    let field = farm.field;
    farm.sim
        .on(farm.world, "harvest-ready", 0, move |ctx, _event| {
            // Plant a replacement mid-dispatch and celebrate once the
            // current pass has fully unwound.
            let seedling = ctx.spawn("seedling", Crop::new(0.5));
            ctx.add_child(field, seedling)?;
            ctx.emit_async("celebrate", Attrs::new(), Propagation::Down);
            Ok(())
        })
        .unwrap();

    for _ in 0..3 {
        farm.sim.step(farm.world, 0.7).unwrap();
    }

    assert_eq!(celebrations.get(), 1);
    let seedling = farm.sim.graph().find(farm.world, "field/seedling").unwrap();
    let planted: &Crop = farm.sim.graph().entity(seedling).unwrap();
    // Spawned mid-pass on the third step, so it has not been updated yet.
    assert_eq!(planted.growth, 0.0);

    // The next step picks it up.
    farm.sim.step(farm.world, 0.7).unwrap();
    let planted: &Crop = farm.sim.graph().entity(seedling).unwrap();
    assert!((planted.growth - 0.35).abs() < 1e-9);
}

#[test]
fn snapshot_restore_snapshot_is_structurally_identical() {
    let mut farm = build_farm();
    for _ in 0..3 {
        farm.sim.step(farm.world, 0.7).unwrap();
    }

    let saved = farm.sim.snapshot(farm.world).unwrap();

    let mut fresh = Sim::new();
    let report = fresh.restore(&saved, &FarmRegistry::new());
    assert!(report.is_complete());
    let root = report.root.unwrap();

    let reloaded = fresh.snapshot(root).unwrap();
    assert_eq!(reloaded, saved);

    // The well re-registered itself with the fresh scheduler on restore.
    let well = fresh.graph().find(root, "well").unwrap();
    assert!(fresh.scheduler().contains(well));
    assert_eq!(fresh.scheduler().interval_of(well), Some(2.0));

    // And the reloaded world keeps simulating from where it left off.
    let harvests = Rc::new(Cell::new(0u32));
    let h = harvests.clone();
    fresh
        .on(root, "harvest-ready", 0, move |_ctx, _event| {
            h.set(h.get() + 1);
            Ok(())
        })
        .unwrap();
    for _ in 0..20 {
        fresh.step(root, 0.7).unwrap();
    }
    // Only the slow crop still had an announcement left in it.
    assert_eq!(harvests.get(), 1);
}

#[test]
fn detached_subtrees_can_be_reattached_elsewhere() {
    let mut farm = build_farm();
    let shed = farm.sim.spawn("shed", Group);
    farm.sim.add_child(farm.world, shed).unwrap();

    farm.sim.remove_child(farm.field, farm.fast_crop).unwrap();
    farm.sim.add_child(shed, farm.fast_crop).unwrap();

    assert_eq!(farm.sim.graph().parent(farm.fast_crop), Some(shed));
    assert_eq!(
        farm.sim.graph().find(farm.world, "shed/wheat"),
        Some(farm.fast_crop)
    );

    // Still updated in its new position.
    farm.sim.step(farm.world, 1.0).unwrap();
    let crop: &Crop = farm.sim.graph().entity(farm.fast_crop).unwrap();
    assert!((crop.growth - 0.5).abs() < 1e-9);
}
