mod common;

use common::{record, setup};
use merlin::{Error, Hook, ModelDefinition, Options, Record, Schema};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

fn seeded_users() -> (merlin::Merlin, common::TestDriver, Arc<merlin::ModelType>) {
    let (merlin, driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();

    driver.seed(
        "users",
        [
            json!({ "id": "u1", "name": "Kit", "age": 30 }),
            json!({ "id": "u2", "name": "Max", "age": 17 }),
            json!({ "id": "u3", "name": "Ann", "age": 45 }),
        ],
    );

    (merlin, driver, users)
}

#[tokio::test]
async fn find_yields_models_in_driver_order() {
    let (_merlin, driver, users) = seeded_users();

    let found = users
        .find(json!({ "age": { "$gte": 18 } }), Options::default())
        .all()
        .await
        .unwrap();

    let names = found
        .iter()
        .map(|user| user.get("name").unwrap())
        .collect::<Vec<_>>();
    assert_eq!(names, [json!("Kit"), json!("Ann")]);
    assert!(found.iter().all(|user| !user.is_new()));

    let calls = driver.calls_to("find");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].collection, "users");
    assert_eq!(calls[0].query, json!({ "age": { "$gte": 18 } }));
}

#[tokio::test]
async fn awaiting_a_stream_collects_it() {
    let (_merlin, _driver, users) = seeded_users();

    let everyone = users.all(Options::default()).await.unwrap();

    assert_eq!(everyone.len(), 3);
    assert_eq!(everyone[2].id(), Some(&json!("u3")));
}

#[tokio::test]
async fn stream_accessors() {
    let (_merlin, _driver, users) = seeded_users();

    let second = users.all(Options::default()).at(1).await.unwrap().unwrap();
    assert_eq!(second.get("name"), Some(json!("Max")));

    let last = users.all(Options::default()).last().await.unwrap().unwrap();
    assert_eq!(last.get("name"), Some(json!("Ann")));

    let missing = users.all(Options::default()).at(7).await.unwrap();
    assert!(missing.is_none());

    let mut seen = Vec::new();
    users
        .all(Options::default())
        .for_each(|user| seen.push(user.id().cloned()))
        .await
        .unwrap();
    assert_eq!(seen, [Some(json!("u1")), Some(json!("u2")), Some(json!("u3"))]);
}

#[tokio::test]
async fn after_find_runs_once_per_record_in_order() {
    let (_merlin, _driver, users) = seeded_users();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let hook_seen = seen.clone();
    users.on(
        "afterFind",
        Hook::new(move |args| {
            hook_seen.lock().unwrap().push(args[0]["name"].clone());
            args[0]["seen"] = json!(true);
            Ok(())
        }),
    );

    let found = users
        .find(json!({ "age": { "$gt": 20 } }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), [json!("Kit"), json!("Ann")]);
    assert!(found.iter().all(|user| user.get("seen") == Some(json!(true))));
}

#[tokio::test]
async fn before_find_can_rewrite_the_query() {
    let (_merlin, driver, users) = seeded_users();

    users.on(
        "beforeFind",
        Hook::new(|args| {
            args[0]["query"]["name"] = json!("Max");
            Ok(())
        }),
    );

    let found = users
        .find(json!({ "name": "Kit" }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), Some(&json!("u2")));
    assert_eq!(driver.calls_to("find")[0].query, json!({ "name": "Max" }));
}

#[tokio::test]
async fn query_hook_sees_every_read() {
    let (_merlin, _driver, users) = seeded_users();
    let queries = Arc::new(Mutex::new(Vec::new()));

    let hook_queries = queries.clone();
    users.on(
        "query",
        Hook::new(move |args| {
            hook_queries.lock().unwrap().push(args[0]["query"].clone());
            Ok(())
        }),
    );

    users.find(json!({ "name": "Kit" }), Options::default()).all().await.unwrap();
    users.count(json!({ "age": 17 }), Options::default()).await.unwrap();

    assert_eq!(
        *queries.lock().unwrap(),
        [json!({ "name": "Kit" }), json!({ "age": 17 })]
    );
}

#[tokio::test]
async fn failing_hooks_abort_the_find() {
    let (_merlin, driver, users) = seeded_users();

    users.on(
        "beforeFind",
        Hook::new_async(|_| async { Err(Error::hook("no reads today")) }),
    );

    let result = users.all(Options::default()).all().await;

    assert!(matches!(result, Err(Error::Hook(message)) if message == "no reads today"));
    assert!(driver.calls_to("find").is_empty());
}

#[tokio::test]
async fn find_one_and_find_by_id_limit_the_driver() {
    let (_merlin, driver, users) = seeded_users();

    let kit = users
        .find_one(json!({ "name": "Kit" }), Options::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kit.id(), Some(&json!("u1")));

    let ann = users.find_by_id("u3", Options::default()).await.unwrap().unwrap();
    assert_eq!(ann.get("name"), Some(json!("Ann")));

    let nobody = users.find_by_id("u9", Options::default()).await.unwrap();
    assert!(nobody.is_none());

    let calls = driver.calls_to("find");
    assert!(calls.iter().all(|call| call.limit == Some(1)));
    assert_eq!(calls[1].query, json!({ "id": "u3" }));
}

#[tokio::test]
async fn find_by_id_rejects_non_scalar_ids() {
    let (_merlin, driver, users) = seeded_users();

    let result = users.find_by_id(json!({ "$ne": null }), Options::default()).await;

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn raw_mode_yields_records() {
    let (_merlin, _driver, users) = seeded_users();
    let raw_flags = Arc::new(Mutex::new(Vec::new()));

    let hook_flags = raw_flags.clone();
    users.on(
        "beforeFind",
        Hook::new(move |args| {
            hook_flags.lock().unwrap().push(args[1]["rawMode"].clone());
            Ok(())
        }),
    );

    let records: Vec<Record> = users
        .find_as::<Record>(json!({ "age": 17 }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(records, [record(json!({ "id": "u2", "name": "Max", "age": 17 }))]);

    users.all(Options::default()).all().await.unwrap();

    assert_eq!(*raw_flags.lock().unwrap(), [json!(true), Value::Null]);
}

#[tokio::test]
async fn count_sums_driver_counts() {
    let (_merlin, driver, users) = seeded_users();

    let adults = users
        .count(json!({ "age": { "$gte": 18 } }), Options::default())
        .await
        .unwrap();
    assert_eq!(adults, 2);

    users.on(
        "afterCount",
        Hook::new(|args| {
            args[0] = json!(args[0].as_u64().unwrap_or_default() * 10);
            Ok(())
        }),
    );

    let everyone = users.count(json!({}), Options::default()).count().await.unwrap();
    assert_eq!(everyone, 30);
    assert_eq!(driver.calls_to("count").len(), 2);
}

#[tokio::test]
async fn insert_applies_defaults_and_yields_stored_models() {
    let (merlin, driver) = setup();
    let users = merlin
        .model(
            "User",
            ModelDefinition::new()
                .default_value("role", "member")
                .default_with("tags", || json!([])),
        )
        .unwrap();

    let inserted = users
        .insert(
            [json!({ "name": "Kit" }), json!({ "name": "Max", "role": "admin" })],
            Options::default(),
        )
        .all()
        .await
        .unwrap();

    assert_eq!(inserted.len(), 2);
    assert!(inserted.iter().all(|user| !user.is_new() && user.id().is_some()));

    let stored = driver.records("users");
    assert_eq!(stored[0]["role"], json!("member"));
    assert_eq!(stored[0]["tags"], json!([]));
    assert_eq!(stored[1]["role"], json!("admin"));
}

#[tokio::test]
async fn insert_hooks_can_rewrite_records() {
    let (merlin, driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();

    users.on(
        "beforeInsert",
        Hook::new(|args| {
            args[0]["source"] = json!("import");
            Ok(())
        }),
    );
    users.on(
        "afterInsert",
        Hook::new_async(|mut args| async move {
            args[0]["announced"] = json!(true);
            Ok(args)
        }),
    );

    let kit = users.create(json!({ "name": "Kit" }), Options::default()).await.unwrap();

    assert_eq!(kit.get("source"), Some(json!("import")));
    assert_eq!(kit.get("announced"), Some(json!(true)));
    assert_eq!(driver.records("users")[0].get("announced"), None);
}

#[tokio::test]
async fn insert_validates_against_the_schema() {
    let (merlin, driver) = setup();

    let mut schema = Schema::new();
    schema
        .add(json!({
            "name": { "type": "string", "required": true },
            "age": { "type": "integer", "min": 0 },
        }))
        .unwrap();

    let users = merlin.model("User", ModelDefinition::from_schema(schema)).unwrap();

    let result = users.create(json!({ "age": -1 }), Options::default()).await;

    let Err(Error::Validation(errors)) = result else {
        panic!("expected validation errors, got {result:?}");
    };
    assert_eq!(errors.errors().len(), 2);
    assert!(driver.records("users").is_empty());

    let skipped = users
        .create(
            json!({ "age": -1 }),
            Options::default().with_skip_schema_validation(true),
        )
        .await;
    assert!(skipped.is_ok());
}

#[tokio::test]
async fn update_writes_the_delta() {
    let (_merlin, driver, users) = seeded_users();

    let updated = users
        .update(
            json!({ "age": { "$lt": 40 } }),
            json!({ "$set": { "active": true } }),
            Options::default(),
        )
        .unwrap()
        .await
        .unwrap();

    assert_eq!(updated, 2);

    let stored = driver.records("users");
    assert_eq!(stored[0]["active"], json!(true));
    assert_eq!(stored[1]["active"], json!(true));
    assert_eq!(stored[2].get("active"), None);
}

#[tokio::test]
async fn update_one_and_update_by_id_touch_a_single_record() {
    let (_merlin, driver, users) = seeded_users();

    users
        .update_by_id("u2", json!({ "$set": { "name": "Maxine" } }), Options::default())
        .unwrap()
        .await
        .unwrap();

    users
        .update_one(json!({}), json!({ "$unset": { "age": "" } }), Options::default())
        .unwrap()
        .await
        .unwrap();

    let stored = driver.records("users");
    assert_eq!(stored[1]["name"], json!("Maxine"));
    assert_eq!(stored[0].get("age"), None);
    assert_eq!(stored[1]["age"], json!(17));
    assert!(driver.calls_to("update").iter().all(|call| call.limit == Some(1)));
}

#[tokio::test]
async fn update_validates_only_written_fields() {
    let (merlin, driver) = setup();

    let mut schema = Schema::new();
    schema
        .add(json!({
            "name": { "type": "string", "required": true },
            "age": { "type": "integer", "min": 0 },
        }))
        .unwrap();

    let users = merlin.model("User", ModelDefinition::from_schema(schema)).unwrap();
    driver.seed("users", [json!({ "id": "u1", "name": "Kit", "age": 3 })]);

    let fine = users
        .update_by_id("u1", json!({ "$set": { "age": 4 } }), Options::default())
        .unwrap()
        .await;
    assert_eq!(fine.unwrap(), 1);

    let invalid = users
        .update_by_id("u1", json!({ "$set": { "age": -4 } }), Options::default())
        .unwrap()
        .await;
    assert!(matches!(invalid, Err(Error::Validation(_))));
    assert_eq!(driver.records("users")[0]["age"], json!(4));
}

#[tokio::test]
async fn before_update_can_rewrite_the_delta() {
    let (_merlin, driver, users) = seeded_users();

    users.on(
        "beforeUpdate",
        Hook::new(|args| {
            args[1]["$set"]["touched"] = json!(true);
            Ok(())
        }),
    );

    users
        .update_by_id("u1", json!({ "$set": { "age": 31 } }), Options::default())
        .unwrap()
        .await
        .unwrap();

    let stored = driver.records("users");
    assert_eq!(stored[0]["age"], json!(31));
    assert_eq!(stored[0]["touched"], json!(true));
}

#[tokio::test]
async fn writes_refuse_sub_queries() {
    let (merlin, driver) = setup();
    merlin.model("User", ModelDefinition::new()).unwrap();
    let posts = merlin.model("Post", ModelDefinition::new()).unwrap();
    posts.many_have_one("User", "author").unwrap();

    let update = posts.update(
        json!({ "author": { "name": "Kit" } }),
        json!({ "$set": { "hidden": true } }),
        Options::default(),
    );
    assert!(matches!(update, Err(Error::SubQuery("update"))));

    let remove = posts.remove(json!({ "author": true }), Options::default());
    assert!(matches!(remove, Err(Error::SubQuery("remove"))));

    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn remove_deletes_matching_records() {
    let (_merlin, driver, users) = seeded_users();

    let removed = users
        .remove(json!({ "age": { "$gte": 18 } }), Options::default())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let removed = users
        .remove_by_id("u9", Options::default())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(removed, 0);

    let remaining = driver.records("users");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["id"], json!("u2"));
}

#[tokio::test]
async fn remove_hooks_fire_around_the_driver() {
    let (_merlin, _driver, users) = seeded_users();
    let events = Arc::new(Mutex::new(Vec::new()));

    for name in ["beforeRemove", "afterRemove"] {
        let events = events.clone();
        users.on(
            name,
            Hook::new(move |args| {
                events.lock().unwrap().push((name, args[0].clone()));
                Ok(())
            }),
        );
    }

    users
        .remove_one(json!({ "name": "Kit" }), Options::default())
        .unwrap()
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events[0].0, "beforeRemove");
    assert_eq!(events[0].1["query"], json!({ "name": "Kit" }));
    assert_eq!(events[0].1["opts"]["limit"], json!(1));
    assert_eq!(events[1], ("afterRemove", json!(1)));
}

#[tokio::test]
async fn index_goes_through_its_hook() {
    let (merlin, driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();

    users.on(
        "index",
        Hook::new(|args| {
            args[0] = json!("profile.email");
            Ok(())
        }),
    );

    users.index("email", Options::default()).await.unwrap();

    let calls = driver.calls_to("index");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].collection, "users");
    assert_eq!(calls[0].query, json!("profile.email"));
}

#[tokio::test]
async fn reserved_keys_fail_materialization() {
    let (merlin, driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();
    driver.seed("users", [json!({ "id": "u1", "save": "oops" })]);

    let result = users.all(Options::default()).all().await;
    assert!(matches!(result, Err(Error::ReservedProperty(key)) if key == "save"));

    let raw = users
        .find_as::<Record>(json!({}), Options::default())
        .all()
        .await;
    assert!(matches!(raw, Err(Error::ReservedProperty(_))));
}

#[tokio::test]
async fn insert_stream_consumes_records_lazily() {
    let (merlin, driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();

    let records = futures_util::stream::iter([
        record(json!({ "name": "Kit" })),
        record(json!({ "name": "Max" })),
    ]);

    let stream = users.insert_stream::<Record>(records, Options::default());
    assert!(driver.records("users").is_empty());

    let stored = stream.all().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(driver.records("users").len(), 2);
}

#[tokio::test]
async fn static_methods_receive_their_type() {
    let (merlin, _driver) = setup();

    let mut schema = Schema::new();
    schema.static_method("describe", |model_type, args| {
        Ok(json!(format!("{} x{}", model_type.collection_name(), args.len())))
    });

    let users = merlin.model("User", ModelDefinition::from_schema(schema)).unwrap();

    assert_eq!(
        users.call_static("describe", &[json!(1), json!(2)]).unwrap(),
        json!("users x2")
    );
    assert!(matches!(
        users.call_static("missing", &[]),
        Err(Error::InvalidArgument(_))
    ));
}
