//! Example demonstrating a lifecycle with a singleton, pooled temporaries and leveled teardown.

use phased_lifecycle::{Level, Lifecycle, Managed, ManagedObject};

struct Registry {
    name: &'static str,
}

impl ManagedObject for Registry {
    fn on_dealloc(&mut self) {
        println!("Registry '{}' deallocated", self.name);
    }
}

struct Scratch(u32);

impl ManagedObject for Scratch {
    fn on_dealloc_prepare(&self) {
        println!("Scratch object {} released by the pool", self.0);
    }
}

phased_lifecycle::singleton_slot! {
    static REGISTRY: Registry = Registry { name: "main" }, level = Level::AppEssential;
}

fn main() {
    println!("=== phased_lifecycle: startup ===");

    let lifecycle = Lifecycle::builder()
        .pool_capacity(4)
        .on_init(Level::AppEssential, |lifecycle| {
            // Eagerly create the singleton as soon as its level is up.
            let registry = REGISTRY.get(lifecycle).unwrap();
            println!("Registry '{}' created during init", registry.name);
        })
        .build();

    lifecycle
        .register(Level::AppHigh, || println!("AppHigh cleanup runs first"))
        .unwrap();
    lifecycle
        .register(Level::FrameworkEssential, || {
            println!("FrameworkEssential cleanup runs last");
        })
        .unwrap();

    // The pool holds at most 4 objects, so the oldest ones are released early.
    for index in 0..6 {
        lifecycle.autorelease(Managed::new(Scratch(index)));
    }
    println!("Pool holds {} objects", lifecycle.pool().len());

    println!("=== phased_lifecycle: shutdown ===");
    lifecycle.teardown();

    println!(
        "Registry available after teardown: {}",
        REGISTRY.get(&lifecycle).is_some()
    );
}
