use critq::prelude::*;
use pretty_assertions::assert_eq;

struct Person;
struct Order;
struct Sample;

critq::entity! {
    Person {
        ID => id in BaseEntity: i64,
        NAME => name: String,
        AGE => age: i32,
        BIRTH_DATE => birth_date as "birthDate": chrono::NaiveDate [Date],
        ORDERS => orders: Vec<Order>,
    }
}

critq::entity! {
    Order {
        ID => id in BaseEntity: i64,
        OWNER => owner: Option<Person>,
        TOTAL => total: f64,
    }
}

critq::entity! {
    Sample {
        F1 => f1: String,
        F2 => f2: String,
    }
}

fn registry() -> FieldRegistry {
    let mut schema = Schema::new();
    schema
        .register::<Person>()
        .register::<Order>()
        .register::<Sample>();
    FieldRegistry::new(schema)
}

#[test]
fn test_resolver_determinism() {
    let reg = registry();
    let id = Person::NAME.identify().unwrap();
    let first = reg.resolve(&id).unwrap();
    let second = reg.resolve(&Person::NAME.identify().unwrap()).unwrap();
    assert_eq!(first.field_name, second.field_name);
    assert_eq!(first.field_type, second.field_type);
    assert_eq!(first.temporal, second.temporal);
    assert_eq!(first, second);
    assert_eq!(reg.len(), 1);
}

#[test]
fn test_descriptor_clone_isolation() {
    let reg = registry();
    let mut local = LocalCache::default();
    let mut a = reg.get_or_init(&Person::AGE, &mut local).unwrap();
    let b = reg.get_or_init(&Person::AGE, &mut local).unwrap();
    a.set_alias("x7");
    assert_eq!(a.path(), "x7.age");
    assert!(b.has_no_alias());
    assert!(reg.resolve(&Person::AGE.identify().unwrap()).unwrap().has_no_alias());
}

#[test]
fn test_parameter_uniqueness() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    for n in 0..10 {
        q.ne(Person::AGE, n);
    }
    let params = q.parameters();
    let mut names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 10);
}

#[test]
fn test_auto_connective() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.eq(Person::NAME, "Ann").gt(Person::AGE, 30);
    let sql = q.sql().unwrap();
    assert_eq!(sql.matches(" AND ").count(), 1);
    assert_eq!(
        sql,
        "SELECT c FROM Person AS c WHERE c.name = :name0 AND c.age > :age1"
    );
}

#[test]
fn test_bracket_balance() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.brackets(|q| {
        q.eq(Person::NAME, "a").or().brackets(|q| {
            q.eq(Person::NAME, "b").brackets(|q| {
                q.lt(Person::AGE, 3).or().gt(Person::AGE, 9).or();
            });
        });
    })
    .not()
    .brackets(|q| {
        q.is_null(Person::BIRTH_DATE).and();
    });
    let sql = q.sql().unwrap();
    assert_eq!(
        sql,
        "SELECT c FROM Person AS c WHERE (c.name = :name0 OR (c.name = :name1 AND \
         (c.age < :age2 OR c.age > :age3))) AND NOT (c.birthDate IS NULL)"
    );
    assert_eq!(sql.matches('(').count(), sql.matches(')').count());
    for dangling in ["AND )", "OR )", "AND)", "OR)", "()"] {
        assert!(!sql.contains(dangling), "{} in {}", dangling, sql);
    }
}

#[test]
fn test_render_idempotence() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.eq(Person::NAME, "Ann")
        .exists::<Order>(|s| {
            s.eq_field(Order::OWNER, Person::ID).gt(Order::TOTAL, 10.0);
        })
        .desc(Person::AGE);
    let first = q.sql().unwrap();
    let second = q.sql().unwrap();
    assert_eq!(first, second);
    assert_eq!(q.count_sql().unwrap(), q.count_sql().unwrap());
    assert_eq!(q.parameters().len(), 2);
}

#[test]
fn test_end_to_end_select_and_count() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.eq(Person::NAME, "Ann");

    assert_eq!(q.sql().unwrap(), "SELECT c FROM Person AS c WHERE c.name = :name0");
    assert_eq!(
        q.count_sql().unwrap(),
        "SELECT COUNT(c) FROM Person AS c WHERE c.name = :name0"
    );

    let params = q.parameters();
    assert_eq!(params.len(), 1);
    let binding = params.get("name0").unwrap();
    assert_eq!(binding.value, Value::from("Ann"));
    assert_eq!(binding.temporal, None);
}

#[test]
fn test_in_with_collection_binding() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.in_(Person::ID, vec![1, 2, 3]);
    assert_eq!(q.sql().unwrap(), "SELECT c FROM Person AS c WHERE c.id IN (:id0)");

    let params = q.parameters();
    assert_eq!(params.len(), 1);
    assert_eq!(params.get("id0").unwrap().value, Value::from(vec![1, 2, 3]));
}

#[test]
fn test_or_brackets_without_trailing_artifact() {
    let reg = registry();
    let mut q = Query::<Sample>::select(&reg);
    q.brackets(|q| {
        q.eq(Sample::F1, "v1").or().eq(Sample::F2, "v2");
    });
    assert_eq!(
        q.sql().unwrap(),
        "SELECT c FROM Sample AS c WHERE (c.f1 = :f10 OR c.f2 = :f21)"
    );
}

#[test]
fn test_join_and_subquery_aliases_never_collide() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.join_on(Person::ORDERS, |o| {
        o.gt(Order::TOTAL, 100.0);
    })
    .not_exists::<Order>(|s| {
        s.eq_field(Order::OWNER, Person::ID).lt(Order::TOTAL, 0.0);
    })
    .in_sub::<_, Order>(Person::ID, |s| {
        s.project(Order::OWNER);
    });
    assert_eq!(
        q.sql().unwrap(),
        "SELECT c FROM Person AS c JOIN c.orders AS c0 ON (c0.total > :total0) \
         WHERE NOT EXISTS (SELECT c1 FROM Order AS c1 WHERE c1.owner = c.id AND c1.total < :total1) \
         AND c.id IN (SELECT c2.owner FROM Order AS c2)"
    );
}

#[test]
fn test_inherited_field_specialized_per_entity() {
    let reg = registry();
    let mut local = LocalCache::default();
    let person_id = reg.get_or_init(&Person::ID, &mut local).unwrap();
    let order_id = reg.get_or_init(&Order::ID, &mut local).unwrap();
    assert_eq!(person_id.owner, "Person");
    assert_eq!(order_id.owner, "Order");
    assert_eq!(reg.len(), 1);
    assert_eq!(reg.stats().specialized, 2);
}

#[test]
fn test_update_and_delete() {
    let reg = registry();
    let mut update = Query::<Person>::update(&reg);
    update.set(Person::AGE, 41).eq(Person::NAME, "Ann");
    assert_eq!(
        update.sql().unwrap(),
        "UPDATE Person AS c SET c.age = :age0 WHERE c.name = :name1"
    );

    let mut delete = Query::<Person>::delete(&reg);
    delete.is_null(Person::NAME);
    assert_eq!(delete.sql().unwrap(), "DELETE FROM Person AS c WHERE c.name IS NULL");
    assert!(matches!(
        delete.count_sql(),
        Err(CriteriaError::Configuration(_))
    ));
}

#[test]
fn test_aggregate_projection_shape() {
    let reg = registry();
    let mut q = Query::<Person>::select(&reg);
    q.project(Person::NAME)
        .project_aggregate(max(Person::AGE))
        .group_by(Person::NAME)
        .having(|h| {
            h.ge(max(Person::AGE), 18);
        });
    assert_eq!(q.shape(), ResultShape::Tuple(2));
    assert_eq!(
        q.sql().unwrap(),
        "SELECT c.name, MAX(c.age) FROM Person AS c GROUP BY c.name HAVING MAX(c.age) >= :age0"
    );
}

#[test]
fn test_schema_from_toml_drives_dynamic_query() {
    let schema = Schema::from_toml_str(
        r#"
        [[entity]]
        name = "Invoice"
        [[entity.field]]
        accessor = "issued_on"
        name = "issuedOn"
        type = "NaiveDate"
        temporal = "date"
        "#,
    )
    .unwrap();
    let reg = FieldRegistry::new(schema);
    let mut q = Query::dynamic(&reg, QueryKind::Select, "i", "Invoice");
    parse_filter("issued_on>=2024-01-01").unwrap().apply("Invoice", &mut q);
    assert_eq!(
        q.sql().unwrap(),
        "SELECT i FROM Invoice AS i WHERE i.issuedOn >= :issuedOn0"
    );
    assert_eq!(
        q.parameters().get("issuedOn0").unwrap().temporal,
        Some(TemporalClass::Date)
    );
}
