//! Type registry and linking.
//!
//! The registry owns every [`Klass`] it defines and is the only place tables
//! are built. Linking a type:
//!
//! 1. Interns the name and computes its hash slot.
//! 2. Extends the superclass's primary chain.
//! 3. Collects secondary supers: overflowed ancestors (farthest first) and
//!    the transitive interfaces.
//! 4. Builds the secondary-supers table and publishes it with the type.
//!
//! Definitions and redefinitions are serialized by one lock per registry;
//! lookups through published types never take it.

use crate::config::SupersConfig;
use crate::error::LinkError;
use crate::hash_slot::HashSlotter;
use crate::klass::{
    Klass, KlassFlags, KlassId, KlassInit, KlassKind, KlassRef, LookupPolicy, Supertypes,
};
use crate::lookup::SecondarySupers;
use crate::primary::{PrimaryChain, SuperCheck};
use crate::symbol::{Symbol, intern};
use crate::table::SupersTableBuilder;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counter distinguishing registries, so foreign types can be rejected.
static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(0);

/// Defines types and builds their subtype-check data.
pub struct KlassRegistry {
    id: u32,
    config: SupersConfig,
    slotter: HashSlotter,
    builder: SupersTableBuilder,
    policy: LookupPolicy,
    /// Map from name to type.
    klasses: RwLock<FxHashMap<Symbol, KlassRef>>,
    /// Counter for allocating type ids.
    next_id: AtomicU32,
    /// Held while linking or relinking.
    link_lock: Mutex<()>,
    root: KlassRef,
}

/// Secondary supers computed for one type.
struct SecondaryCandidates {
    transitive_interfaces: Vec<KlassRef>,
    secondaries: Vec<KlassRef>,
    has_overflow: bool,
}

impl KlassRegistry {
    /// Create a registry with its root class.
    pub fn new(config: SupersConfig) -> Result<Self, LinkError> {
        config.validate()?;
        let slotter = HashSlotter::new(&config)?;
        let builder = SupersTableBuilder::new(&config)?;
        let policy = LookupPolicy {
            use_table: config.use_secondary_table,
            verify: config.verify_lookups,
        };
        let id = NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed);

        let root_id = KlassId::from_raw(0);
        let name = intern(&config.root_name);
        let (primary, super_check) = PrimaryChain::root(root_id);
        let root = Arc::new(Klass::new(KlassInit {
            hash_slot: slotter.compute_hash_slot(name.as_str()),
            name: name.clone(),
            id: root_id,
            registry: id,
            kind: KlassKind::Class,
            super_klass: None,
            primary,
            super_check,
            flags: KlassFlags::ROOT,
            policy,
            supertypes: Supertypes::new(
                Box::default(),
                Box::default(),
                SecondarySupers::empty(builder.shape()),
            ),
        }));

        let mut klasses = FxHashMap::default();
        klasses.insert(name, Arc::clone(&root));

        Ok(Self {
            id,
            config,
            slotter,
            builder,
            policy,
            klasses: RwLock::new(klasses),
            next_id: AtomicU32::new(1),
            link_lock: Mutex::new(()),
            root,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The root class.
    #[inline]
    pub fn root(&self) -> &KlassRef {
        &self.root
    }

    /// Configuration this registry was created with.
    #[inline]
    pub fn config(&self) -> &SupersConfig {
        &self.config
    }

    /// Hash-slot function used for names.
    #[inline]
    pub fn slotter(&self) -> &HashSlotter {
        &self.slotter
    }

    /// Table builder used for secondary supers.
    #[inline]
    pub fn builder(&self) -> &SupersTableBuilder {
        &self.builder
    }

    /// Look up a type by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<KlassRef> {
        let klasses = self.klasses.read();
        klasses.get(name).cloned()
    }

    /// Check if a type is defined.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        let klasses = self.klasses.read();
        klasses.contains_key(name)
    }

    /// Number of defined types, including the root.
    pub fn len(&self) -> usize {
        let klasses = self.klasses.read();
        klasses.len()
    }

    /// Check if the registry holds only the root.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// All defined types in id order.
    pub fn klasses(&self) -> Vec<KlassRef> {
        let klasses = self.klasses.read();
        let mut all: Vec<KlassRef> = klasses.values().cloned().collect();
        all.sort_by_key(|k| k.id());
        all
    }

    // =========================================================================
    // Linking
    // =========================================================================

    /// Define a class.
    ///
    /// `super_klass` defaults to the root.
    pub fn define_class(
        &self,
        name: &str,
        super_klass: Option<&KlassRef>,
        interfaces: &[KlassRef],
    ) -> Result<KlassRef, LinkError> {
        let super_klass = super_klass.unwrap_or(&self.root);
        self.check_owned(super_klass)?;
        if super_klass.is_interface() {
            return Err(LinkError::SuperIsInterface(super_klass.name().to_string()));
        }
        self.link(name, KlassKind::Class, super_klass, interfaces)
    }

    /// Define an interface extending `super_interfaces`.
    pub fn define_interface(
        &self,
        name: &str,
        super_interfaces: &[KlassRef],
    ) -> Result<KlassRef, LinkError> {
        self.link(name, KlassKind::Interface, &self.root, super_interfaces)
    }

    fn link(
        &self,
        name: &str,
        kind: KlassKind,
        super_klass: &KlassRef,
        interfaces: &[KlassRef],
    ) -> Result<KlassRef, LinkError> {
        if name.is_empty() {
            return Err(LinkError::EmptyName);
        }
        self.check_interfaces(interfaces)?;

        let _guard = self.link_lock.lock();
        if self.contains(name) {
            return Err(LinkError::DuplicateName(name.to_string()));
        }

        let id = KlassId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = intern(name);
        let hash_slot = self.slotter.compute_hash_slot(name.as_str());
        let (primary, super_check) = super_klass.primary_supers().extend(
            id,
            kind == KlassKind::Class,
            self.config.primary_super_limit,
        );

        let candidates = self.collect_secondary_supers(Some(super_klass), interfaces);
        let secondary = self.build_table(&name, candidates.secondaries);

        let mut flags = KlassFlags::empty();
        if kind == KlassKind::Class && super_check == SuperCheck::Secondary {
            flags |= KlassFlags::PRIMARY_OVERFLOW;
        }
        if candidates.has_overflow {
            flags |= KlassFlags::HAS_OVERFLOW_SUPERS;
        }

        let klass = Arc::new(Klass::new(KlassInit {
            name: name.clone(),
            id,
            registry: self.id,
            kind,
            hash_slot,
            super_klass: Some(Arc::clone(super_klass)),
            primary,
            super_check,
            flags,
            policy: self.policy,
            supertypes: Supertypes::new(
                interfaces.into(),
                candidates.transitive_interfaces.into(),
                secondary,
            ),
        }));

        tracing::debug!(
            name = %name,
            id = %id,
            ?kind,
            hash_slot,
            ?super_check,
            "linked type"
        );

        self.klasses.write().insert(name, Arc::clone(&klass));
        Ok(klass)
    }

    /// Replace the declared interfaces of `klass` and republish its table.
    ///
    /// Types already linked against `klass` keep their own tables.
    pub fn redefine_interfaces(
        &self,
        klass: &KlassRef,
        interfaces: &[KlassRef],
    ) -> Result<(), LinkError> {
        self.check_owned(klass)?;

        // Cycle check and publish must see the same hierarchy.
        let _guard = self.link_lock.lock();
        self.check_interfaces(interfaces)?;
        if let Some(cycle) = interfaces.iter().find(|i| i.is_subtype_of(klass)) {
            return Err(LinkError::CircularInheritance(cycle.name().to_string()));
        }

        let candidates = self.collect_secondary_supers(klass.super_klass(), interfaces);
        let secondary = self.build_table(klass.name(), candidates.secondaries);
        let len = secondary.len();
        let bitmap = secondary.bitmap();

        klass.replace_supertypes(Supertypes::new(
            interfaces.into(),
            candidates.transitive_interfaces.into(),
            secondary,
        ));

        tracing::info!(
            name = %klass.name(),
            len,
            bitmap = %format_args!("{bitmap:#018x}"),
            "redefined secondary supers"
        );
        Ok(())
    }

    /// Recheck the published table of every type. Fatal on mismatch.
    pub fn verify(&self) {
        for klass in self.klasses() {
            klass.verify_secondary_supers();
        }
    }

    // =========================================================================
    // Secondary Supers
    // =========================================================================

    /// Collect the secondary supers of a type with the given superclass and
    /// declared interfaces.
    fn collect_secondary_supers(
        &self,
        super_klass: Option<&KlassRef>,
        interfaces: &[KlassRef],
    ) -> SecondaryCandidates {
        let mut seen: FxHashSet<KlassId> = FxHashSet::default();
        let mut transitive_interfaces = Vec::new();

        let mut add = |iface: &KlassRef| {
            if seen.insert(iface.id()) {
                transitive_interfaces.push(Arc::clone(iface));
            }
        };

        if let Some(super_klass) = super_klass {
            super_klass
                .supertypes()
                .transitive_interfaces()
                .iter()
                .for_each(&mut add);
        }
        for iface in interfaces {
            add(iface);
            iface
                .supertypes()
                .transitive_interfaces()
                .iter()
                .for_each(&mut add);
        }

        // Ancestors that overflowed the primary chain, nearest first.
        let mut overflow = Vec::new();
        let mut ancestor = super_klass;
        while let Some(klass) = ancestor {
            if klass.super_check().is_primary() {
                break;
            }
            if !seen.contains(&klass.id()) {
                overflow.push(Arc::clone(klass));
            }
            ancestor = klass.super_klass();
        }
        let has_overflow = !overflow.is_empty();

        let secondaries = overflow
            .into_iter()
            .rev()
            .chain(transitive_interfaces.iter().cloned())
            .collect();

        SecondaryCandidates {
            transitive_interfaces,
            secondaries,
            has_overflow,
        }
    }

    fn build_table(&self, name: &Symbol, secondaries: Vec<KlassRef>) -> SecondarySupers<KlassRef> {
        let table = self.builder.build(secondaries);
        if table.bitmap().is_full() {
            tracing::warn!(
                name = %name,
                len = table.len(),
                "secondary supers do not fit the hash table; lookups will scan linearly"
            );
        }
        table
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn check_owned(&self, klass: &Klass) -> Result<(), LinkError> {
        if klass.registry() != self.id {
            return Err(LinkError::UnknownType(klass.name().to_string()));
        }
        Ok(())
    }

    fn check_interfaces(&self, interfaces: &[KlassRef]) -> Result<(), LinkError> {
        for iface in interfaces {
            self.check_owned(iface)?;
            if !iface.is_interface() {
                return Err(LinkError::NotAnInterface(iface.name().to_string()));
            }
        }
        Ok(())
    }
}

impl Default for KlassRegistry {
    fn default() -> Self {
        match Self::new(SupersConfig::default()) {
            Ok(registry) => registry,
            Err(err) => unreachable!("default configuration is valid: {err}"),
        }
    }
}

impl std::fmt::Debug for KlassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlassRegistry")
            .field("id", &self.id)
            .field("root", &self.root.name().as_str())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> KlassRegistry {
        KlassRegistry::new(SupersConfig {
            verify_lookups: true,
            ..Default::default()
        })
        .unwrap()
    }

    // =========================================================================
    // Registry Basics
    // =========================================================================

    #[test]
    fn test_registry_creation() {
        let registry = registry();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 1);
        let root = registry.root();
        assert_eq!(root.name().as_str(), "Object");
        assert_eq!(root.id().raw(), 0);
        assert!(root.flags().contains(KlassFlags::ROOT));
        assert!(root.super_klass().is_none());
        assert!(registry.get("Object").is_some());
    }

    #[test]
    fn test_invalid_config() {
        let err = KlassRegistry::new(SupersConfig {
            table_size: 100,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_ids_are_sequential() {
        let registry = registry();
        let a = registry.define_class("A", None, &[]).unwrap();
        let b = registry.define_interface("B", &[]).unwrap();
        assert_eq!(a.id().raw(), 1);
        assert_eq!(b.id().raw(), 2);
        let ids: Vec<u32> = registry.klasses().iter().map(|k| k.id().raw()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    // =========================================================================
    // Linking
    // =========================================================================

    #[test]
    fn test_class_chain() {
        let registry = registry();
        let number = registry.define_class("Number", None, &[]).unwrap();
        let integer = registry.define_class("Integer", Some(&number), &[]).unwrap();

        assert_eq!(integer.super_check(), SuperCheck::Primary { depth: 2 });
        assert_eq!(integer.primary_supers().len(), 3);
        assert!(integer.is_subtype_of(&number));
        assert!(integer.is_subtype_of(registry.root()));
        assert!(!number.is_subtype_of(&integer));
        assert!(integer.supertypes().secondary().is_empty());
    }

    #[test]
    fn test_interfaces_are_secondary() {
        let registry = registry();
        let comparable = registry.define_interface("Comparable", &[]).unwrap();
        let runnable = registry.define_interface("Runnable", &[]).unwrap();
        let task = registry
            .define_class("Task", None, &[Arc::clone(&runnable)])
            .unwrap();

        assert_eq!(runnable.super_check(), SuperCheck::Secondary);
        assert!(runnable.is_subtype_of(registry.root()));
        assert!(task.is_subtype_of(&runnable));
        assert!(!task.is_subtype_of(&comparable));
        assert!(runnable.is_subtype_of(&runnable));
    }

    #[test]
    fn test_transitive_interfaces() {
        let registry = registry();
        let iterable = registry.define_interface("Iterable", &[]).unwrap();
        let collection = registry
            .define_interface("Collection", &[Arc::clone(&iterable)])
            .unwrap();
        let list = registry
            .define_interface("List", &[Arc::clone(&collection)])
            .unwrap();
        let array_list = registry
            .define_class("ArrayList", None, &[Arc::clone(&list)])
            .unwrap();

        let names: Vec<String> = array_list
            .supertypes()
            .transitive_interfaces()
            .iter()
            .map(|k| k.name().to_string())
            .collect();
        assert_eq!(names, vec!["List", "Collection", "Iterable"]);
        assert!(array_list.is_subtype_of(&iterable));
        assert!(array_list.is_subtype_of(&collection));
        assert_eq!(array_list.supertypes().local_interfaces().len(), 1);
    }

    #[test]
    fn test_inherited_interfaces_deduplicated() {
        let registry = registry();
        let runnable = registry.define_interface("Runnable", &[]).unwrap();
        let base = registry
            .define_class("Base", None, &[Arc::clone(&runnable)])
            .unwrap();
        let derived = registry
            .define_class("Derived", Some(&base), &[Arc::clone(&runnable)])
            .unwrap();
        assert_eq!(derived.supertypes().transitive_interfaces().len(), 1);
        assert_eq!(derived.supertypes().secondary().len(), 1);
        assert!(derived.is_subtype_of(&runnable));
    }

    #[test]
    fn test_primary_overflow() {
        let registry = registry();
        let mut chain = vec![Arc::clone(registry.root())];
        for depth in 1..=11 {
            let parent = chain.last().cloned();
            let klass = registry
                .define_class(&format!("C{depth}"), parent.as_ref(), &[])
                .unwrap();
            chain.push(klass);
        }

        let deepest = &chain[11];
        assert_eq!(chain[7].super_check(), SuperCheck::Primary { depth: 7 });
        assert_eq!(chain[8].super_check(), SuperCheck::Secondary);
        assert!(chain[8].flags().contains(KlassFlags::PRIMARY_OVERFLOW));
        assert!(deepest.flags().contains(KlassFlags::HAS_OVERFLOW_SUPERS));

        // Overflowed ancestors, farthest first.
        let secondary: Vec<String> = deepest
            .supertypes()
            .secondary()
            .iter()
            .map(|k| k.name().to_string())
            .collect();
        assert_eq!(secondary.len(), 3);
        for name in ["C8", "C9", "C10"] {
            assert!(secondary.iter().any(|s| s == name));
        }

        for ancestor in &chain {
            assert!(deepest.is_subtype_of(ancestor), "C11 !<: {}", ancestor.name());
        }
        assert!(!chain[9].is_subtype_of(deepest));
    }

    #[test]
    fn test_overflow_candidate_order() {
        let registry = registry();
        let mut parent = Arc::clone(registry.root());
        for depth in 1..=10 {
            parent = registry
                .define_class(&format!("D{depth}"), Some(&parent), &[])
                .unwrap();
        }
        let candidates = registry.collect_secondary_supers(Some(&parent), &[]);
        let names: Vec<String> = candidates
            .secondaries
            .iter()
            .map(|k| k.name().to_string())
            .collect();
        assert_eq!(names, vec!["D8", "D9", "D10"]);
        assert!(candidates.has_overflow);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_duplicate_name() {
        let registry = registry();
        registry.define_class("A", None, &[]).unwrap();
        assert_eq!(
            registry.define_interface("A", &[]).unwrap_err(),
            LinkError::DuplicateName("A".into())
        );
        assert_eq!(
            registry.define_class("Object", None, &[]).unwrap_err(),
            LinkError::DuplicateName("Object".into())
        );
    }

    #[test]
    fn test_empty_name() {
        let registry = registry();
        assert_eq!(registry.define_class("", None, &[]).unwrap_err(), LinkError::EmptyName);
    }

    #[test]
    fn test_kind_mismatches() {
        let registry = registry();
        let class = registry.define_class("Thread", None, &[]).unwrap();
        let iface = registry.define_interface("Runnable", &[]).unwrap();

        assert_eq!(
            registry
                .define_class("Bad", None, &[Arc::clone(&class)])
                .unwrap_err(),
            LinkError::NotAnInterface("Thread".into())
        );
        assert_eq!(
            registry.define_class("Bad", Some(&iface), &[]).unwrap_err(),
            LinkError::SuperIsInterface("Runnable".into())
        );
    }

    #[test]
    fn test_foreign_type_rejected() {
        let a = registry();
        let b = registry();
        let foreign = b.define_interface("Runnable", &[]).unwrap();
        assert_eq!(
            a.define_class("Task", None, &[foreign]).unwrap_err(),
            LinkError::UnknownType("Runnable".into())
        );
        assert!(!a.contains("Task"));
    }

    // =========================================================================
    // Redefinition
    // =========================================================================

    #[test]
    fn test_redefine_interfaces() {
        let registry = registry();
        let runnable = registry.define_interface("Runnable", &[]).unwrap();
        let closeable = registry.define_interface("Closeable", &[]).unwrap();
        let task = registry
            .define_class("Task", None, &[Arc::clone(&runnable)])
            .unwrap();

        let before = task.supertypes();
        registry
            .redefine_interfaces(&task, &[Arc::clone(&closeable)])
            .unwrap();

        assert!(task.is_subtype_of(&closeable));
        assert!(!task.is_subtype_of(&runnable));
        assert_eq!(task.redefinition_count(), 1);
        // Snapshots taken before the swap stay intact.
        assert!(before.secondary().contains(&*runnable));
        task.verify_secondary_supers();
    }

    #[test]
    fn test_redefine_circular() {
        let registry = registry();
        let a = registry.define_interface("A", &[]).unwrap();
        let b = registry.define_interface("B", &[Arc::clone(&a)]).unwrap();
        assert_eq!(
            registry.redefine_interfaces(&a, &[Arc::clone(&b)]).unwrap_err(),
            LinkError::CircularInheritance("B".into())
        );
        assert_eq!(
            registry.redefine_interfaces(&a, &[Arc::clone(&a)]).unwrap_err(),
            LinkError::CircularInheritance("A".into())
        );
    }

    #[test]
    fn test_concurrent_opposite_redefinitions_stay_acyclic() {
        let registry = registry();
        for round in 0..64 {
            let a = registry.define_interface(&format!("A{round}"), &[]).unwrap();
            let b = registry.define_interface(&format!("B{round}"), &[]).unwrap();
            let barrier = std::sync::Barrier::new(2);

            let (ab, ba) = std::thread::scope(|s| {
                let ab = s.spawn(|| {
                    barrier.wait();
                    registry.redefine_interfaces(&a, &[Arc::clone(&b)])
                });
                let ba = s.spawn(|| {
                    barrier.wait();
                    registry.redefine_interfaces(&b, &[Arc::clone(&a)])
                });
                (ab.join().unwrap(), ba.join().unwrap())
            });

            assert!(ab.is_ok() != ba.is_ok(), "round {round}: {ab:?} {ba:?}");
            assert!(!(a.is_subtype_of(&b) && b.is_subtype_of(&a)));
            let err = ab.err().or(ba.err()).unwrap();
            assert!(matches!(err, LinkError::CircularInheritance(_)));
        }
    }

    #[test]
    fn test_verify_all() {
        let registry = registry();
        let ifaces: Vec<KlassRef> = (0..10)
            .map(|i| registry.define_interface(&format!("I{i}"), &[]).unwrap())
            .collect();
        registry.define_class("Wide", None, &ifaces).unwrap();
        registry.verify();
    }
}
