//! # Engine Tier Tests (T0-T3)
//!
//! If ANY tier fails, the engine is INVALID.
//!
//! ## Tiers
//! - T0: Descriptor Loading
//! - T1: Validation
//! - T2: Query Compilation
//! - T3: Shared Snapshots and Reload

use archetype_core::{
    ArchetypeDescriptorCache, ArchetypeId, ArchetypeQuery, ArchetypeSelector, CollectionConstraint,
    Constraint, DescriptorLoadError, DescriptorRegistry, DynamicObject, ObjectReference,
    QueryBuildError, QueryCompiler, SortConstraint, StaticLookups, TextSource, ValidationErrorKind,
    Validator, Value,
};
use std::sync::Arc;

const PRACTICE: &str = include_str!("fixtures/practice.toml");

fn cache() -> ArchetypeDescriptorCache {
    ArchetypeDescriptorCache::load(&TextSource::toml(PRACTICE)).expect("fixture loads")
}

fn lookups() -> Arc<StaticLookups> {
    Arc::new(
        StaticLookups::new()
            .with("lookup.species", ["CANINE", "FELINE"])
            .with("lookup.personTitle", ["MR", "MS", "DR"]),
    )
}

fn customer() -> DynamicObject {
    DynamicObject::of("party.customerperson")
        .expect("archetype")
        .with("firstName", "Jo")
        .with("lastName", "Smith")
}

fn pet(id: u64) -> Value {
    Value::Reference(ObjectReference::new(
        ArchetypeId::parse("party.patientpet").expect("archetype"),
        id,
    ))
}

// =============================================================================
// TIER T0: DESCRIPTOR LOADING
// =============================================================================

mod t0_descriptor_loading {
    use super::*;

    /// T0.1: Every declared archetype is loaded and found by exact name.
    #[test]
    fn fixture_loads() {
        let cache = cache();
        assert_eq!(cache.len(), 11);

        let customer = cache.get("party.customerperson").expect("customer");
        assert_eq!(customer.backing_type(), "Party");
        assert_eq!(customer.display_name(), "Customer");
        assert!(cache.get("party.unknown").is_none());
    }

    /// T0.2: Wildcard lookup returns matches in declaration order.
    #[test]
    fn wildcard_lookup_in_declaration_order() {
        let cache = cache();
        let names = |pattern: &str| -> Vec<String> {
            cache
                .get_by_wildcard(pattern)
                .iter()
                .map(|d| d.short_name().to_string())
                .collect()
        };

        assert_eq!(
            names("party.*"),
            vec![
                "party.customerperson",
                "party.patientpet",
                "party.supplierorganisation"
            ]
        );
        assert_eq!(
            names("act.customer*"),
            vec![
                "act.customerAppointment",
                "act.customerAccountChargesInvoice",
                "act.customerAccountInvoiceItem"
            ]
        );
        assert_eq!(names("*Invoice"), vec!["act.customerAccountChargesInvoice"]);
        assert!(names("party.pat*ent").is_empty());
    }

    /// T0.3: Primary-only listing hides helper archetypes.
    #[test]
    fn primary_only_listing() {
        let cache = cache();
        assert_eq!(cache.short_names("contact.*", false).len(), 2);
        assert!(cache.short_names("contact.*", true).is_empty());
    }

    /// T0.4: An assertion of an undeclared type fails the whole load.
    #[test]
    fn undeclared_assertion_type_rejected() {
        let text = r#"
[[archetype]]
name = "party.customerperson"
type = "Party"

[[archetype.node]]
name = "lastName"

[[archetype.node.assertion]]
name = "noSuchAssertion"
"#;
        let err = ArchetypeDescriptorCache::load(&TextSource::toml(text)).expect_err("rejected");
        assert!(matches!(
            err,
            DescriptorLoadError::UnknownAssertionType { ref assertion, .. } if assertion == "noSuchAssertion"
        ));
    }

    /// T0.5: Malformed built-in assertions are caught at load time.
    #[test]
    fn malformed_regex_rejected() {
        let text = r#"
[[archetype]]
name = "party.customerperson"
type = "Party"

[[archetype.node]]
name = "lastName"

[[archetype.node.assertion]]
name = "regularExpression"
properties = { expression = "([a-z" }
"#;
        let err = ArchetypeDescriptorCache::load(&TextSource::toml(text)).expect_err("rejected");
        assert!(matches!(err, DescriptorLoadError::InvalidAssertion { .. }));
    }
}

// =============================================================================
// TIER T1: VALIDATION
// =============================================================================

mod t1_validation {
    use super::*;

    /// T1.1: A required node yields exactly one error; filling it clears the
    /// error; emptying it again reproduces the same error.
    #[test]
    fn required_node_round_trip() {
        let cache = cache();
        let validator = Validator::new(&cache);
        let mut object = customer();

        object.unset("firstName");
        let missing = validator.validate(&object).expect("validate");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].node, "firstName");

        object = object.with("firstName", "Jo");
        assert!(validator.validate(&object).expect("validate").is_empty());

        object.unset("firstName");
        assert_eq!(validator.validate(&object).expect("validate"), missing);
    }

    /// T1.2: Up to N in-range references validate; the (N+1)th is one error.
    #[test]
    fn range_limited_collection() {
        let cache = cache();
        let validator = Validator::new(&cache);
        let mut object = customer();

        for id in 1..=3 {
            object.add("patients", pet(id));
        }
        assert!(validator.validate(&object).expect("validate").is_empty());

        object.add("patients", pet(4));
        let errors = validator.validate(&object).expect("validate");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "patients");
    }

    /// T1.3: One out-of-range reference is one error naming the node.
    #[test]
    fn out_of_range_reference() {
        let cache = cache();
        let mut object = customer();
        object.add(
            "patients",
            Value::Reference(ObjectReference::new(
                ArchetypeId::parse("party.supplierorganisation").expect("archetype"),
                9,
            )),
        );

        let errors = Validator::new(&cache).validate(&object).expect("validate");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node, "patients");
        assert_eq!(errors[0].kind, ValidationErrorKind::ArchetypeRange);
    }

    /// T1.4: `\d+` accepts "123" and rejects "abc".
    #[test]
    fn regex_assertion() {
        let cache = cache();
        let validator = Validator::new(&cache).with_lookups(lookups());
        let patient = |chip: &str| {
            DynamicObject::of("party.patientpet")
                .expect("archetype")
                .with("name", "Fido")
                .with("species", "CANINE")
                .with("microchip", chip)
        };

        assert!(validator.validate(&patient("123")).expect("validate").is_empty());
        let errors = validator.validate(&patient("abc")).expect("validate");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::Pattern);
    }

    /// T1.5: Errors in composed objects carry their nested path.
    #[test]
    fn nested_invoice_items() {
        let cache = cache();
        let item = |quantity: i64| {
            DynamicObject::of("act.customerAccountInvoiceItem")
                .expect("archetype")
                .with("quantity", quantity)
        };
        let mut invoice = DynamicObject::of("act.customerAccountChargesInvoice").expect("archetype");
        invoice.add("items", item(2));
        invoice.add("items", item(0));

        let errors = Validator::new(&cache).validate(&invoice).expect("validate");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/items[1]/quantity");
        assert_eq!(errors[0].archetype, "act.customerAccountInvoiceItem");
    }

    /// T1.6: Validation is total: every violation in one pass, node order.
    #[test]
    fn validation_is_total() {
        let cache = cache();
        let mut object = DynamicObject::of("party.customerperson")
            .expect("archetype")
            .with("title", "LORD")
            .with("lastName", "Sm1th");
        object.add("contacts", DynamicObject::of("contact.phoneNumber").expect("archetype"));

        let errors = Validator::new(&cache)
            .with_lookups(lookups())
            .validate(&object)
            .expect("validate");
        let nodes: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            nodes,
            vec![
                "/title",
                "/firstName",
                "/lastName",
                "/contacts[0]/telephoneNumber"
            ]
        );
    }
}

// =============================================================================
// TIER T2: QUERY COMPILATION
// =============================================================================

mod t2_query_compilation {
    use super::*;
    use archetype_core::query::ArchetypeProperty;

    /// T2.1: One selector plus one equality is a single flat conjunction.
    #[test]
    fn selector_and_equality() {
        let cache = cache();
        let query = ArchetypeQuery::new(
            ArchetypeSelector::short_name("party.patientpet").with_alias("p"),
        )
        .add(Constraint::eq("species", "CANINE"));
        let compiled = QueryCompiler::new(&cache).compile(&query).expect("compile");

        assert_eq!(
            compiled.text,
            "SELECT p FROM Party AS p WHERE p.archetypeId.entityName = :entityName0 \
             AND p.archetypeId.concept = :concept0 AND p.details.species = :species0"
        );
        let node_parameters: Vec<_> = compiled
            .parameters
            .names()
            .filter(|n| n.starts_with("species"))
            .collect();
        assert_eq!(node_parameters, vec!["species0"]);
    }

    /// T2.2: Polymorphic selectors are an ordered disjunction of conjunctions.
    #[test]
    fn polymorphic_disjunction() {
        let cache = cache();
        let query = ArchetypeQuery::new(
            ArchetypeSelector::short_names(&["organization.organization", "person.person"])
                .with_alias("e"),
        );
        let compiled = QueryCompiler::new(&cache).compile(&query).expect("compile");

        assert!(compiled.text.ends_with(
            "WHERE ((e.archetypeId.entityName = :entityName0 AND e.archetypeId.concept = :concept0) \
             OR (e.archetypeId.entityName = :entityName1 AND e.archetypeId.concept = :concept1))"
        ));
        assert_eq!(
            compiled.parameters.get("entityName0"),
            Some(&Value::from("organization"))
        );
    }

    /// T2.3: Sort terms follow insertion order.
    #[test]
    fn sorts_in_insertion_order() {
        let cache = cache();
        let query = ArchetypeQuery::new(
            ArchetypeSelector::short_name("party.customerperson").with_alias("c"),
        )
        .add(CollectionConstraint::new("contacts").with_alias("k"))
        .sort(SortConstraint::node("c.lastName", false))
        .sort(SortConstraint::archetype("k", ArchetypeProperty::Concept, true));
        let compiled = QueryCompiler::new(&cache).compile(&query).expect("compile");

        assert!(compiled.text.contains("INNER JOIN c.contacts AS k"));
        assert!(compiled
            .text
            .ends_with("ORDER BY c.lastName DESC, k.archetypeId.concept ASC"));
    }

    /// T2.4: Three roots correlated by two id constraints.
    #[test]
    fn three_correlated_roots() {
        let cache = cache();
        let query = ArchetypeQuery::new(
            ArchetypeSelector::short_name("party.customerperson").with_alias("c"),
        )
        .add_root(ArchetypeSelector::short_name("entityRelationship.patientOwner").with_alias("r"))
        .add_root(ArchetypeSelector::short_name("party.patientpet").with_alias("p"))
        .add(Constraint::id_eq("c", "r.source"))
        .add(Constraint::id_eq("p", "r.target"));
        let compiled = QueryCompiler::new(&cache).compile(&query).expect("compile");

        assert!(compiled
            .text
            .starts_with("SELECT c FROM Party AS c, EntityRelationship AS r, Party AS p WHERE"));
        assert!(compiled
            .text
            .ends_with("AND c.linkId = r.source.linkId AND p.linkId = r.target.linkId"));
    }

    /// T2.5: A JSON query document compiles like its builder equivalent.
    #[test]
    fn query_document() {
        let cache = cache();
        let json = r#"{
            "roots": [{"alias": "a", "archetypes": {"short_names": ["act.customerAppointment"]}}],
            "constraints": [{"node": {"node": "status", "operator": "in", "values": ["PENDING", "CHECKED_IN"]}}],
            "max_results": {"limit": 50}
        }"#;
        let document: ArchetypeQuery = serde_json::from_str(json).expect("parse");
        let built = ArchetypeQuery::new(
            ArchetypeSelector::short_name("act.customerAppointment").with_alias("a"),
        )
        .add(Constraint::is_in("status", ["PENDING", "CHECKED_IN"]))
        .max_results(archetype_core::query::MaxResults::Limit(50));

        let compiler = QueryCompiler::new(&cache);
        assert_eq!(
            compiler.compile(&document).expect("document"),
            compiler.compile(&built).expect("built")
        );
    }

    /// T2.6: A selector matching nothing fails compilation.
    #[test]
    fn unknown_archetype_fails() {
        let cache = cache();
        let query = ArchetypeQuery::new(ArchetypeSelector::short_name("party.horse*"));
        assert!(matches!(
            QueryCompiler::new(&cache).compile(&query),
            Err(QueryBuildError::NoMatchingArchetypes(_))
        ));
    }
}

// =============================================================================
// TIER T3: SHARED SNAPSHOTS AND RELOAD
// =============================================================================

mod t3_snapshots {
    use super::*;
    use std::thread;

    /// T3.1: Concurrent readers compile identical text from one snapshot.
    #[test]
    fn concurrent_compilation_is_identical() {
        let registry = Arc::new(DescriptorRegistry::load(&TextSource::toml(PRACTICE)).expect("load"));
        let query = Arc::new(
            ArchetypeQuery::new(ArchetypeSelector::short_name("party.*"))
                .add(Constraint::like("name", "F*"))
                .add(CollectionConstraint::new("patients")),
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let query = Arc::clone(&query);
                thread::spawn(move || {
                    let cache = registry.snapshot();
                    QueryCompiler::new(&cache).compile(&query).expect("compile")
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    /// T3.2: A pinned snapshot survives a reload; new readers see the new cache.
    #[test]
    fn reload_publishes_new_snapshot() {
        let registry = DescriptorRegistry::load(&TextSource::toml(PRACTICE)).expect("load");
        let pinned = registry.snapshot();

        let replacement = r#"
[[archetype]]
name = "party.horse"
type = "Party"
"#;
        registry
            .reload(&TextSource::toml(replacement))
            .expect("reload");

        assert_eq!(pinned.len(), 11);
        assert!(pinned.get("party.horse").is_none());
        assert_eq!(registry.snapshot().len(), 1);
        assert!(registry.snapshot().get("party.horse").is_some());
    }

    /// T3.3: A failed reload leaves the current snapshot in place.
    #[test]
    fn failed_reload_keeps_snapshot() {
        let registry = DescriptorRegistry::load(&TextSource::toml(PRACTICE)).expect("load");
        assert!(registry.reload(&TextSource::toml("[[archetype]]\nname = 3")).is_err());
        assert_eq!(registry.snapshot().len(), 11);
    }
}
