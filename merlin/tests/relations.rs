mod common;

use common::{TestDriver, setup, setup_with};
use merlin::{
    Config, Error, Merlin, ModelDefinition, ModelType, Options, RelationKind, RelationOptions,
    SubModel,
};
use serde_json::json;
use std::sync::Arc;

struct Blog {
    _merlin: Merlin,
    driver: TestDriver,
    users: Arc<ModelType>,
    posts: Arc<ModelType>,
    tags: Arc<ModelType>,
}

fn blog_with(config: Config) -> Blog {
    let (merlin, driver) = setup_with(config);

    let users = merlin.model("User", ModelDefinition::new()).unwrap();
    let posts = merlin.model("Post", ModelDefinition::new()).unwrap();
    let tags = merlin.model("Tag", ModelDefinition::new()).unwrap();

    posts.many_have_one("User", "author").unwrap();
    posts.has_many("Tag", RelationOptions::new()).unwrap();

    driver.seed(
        "users",
        [
            json!({ "id": "u1", "name": "Kit" }),
            json!({ "id": "u2", "name": "Max" }),
        ],
    );
    driver.seed(
        "posts",
        [
            json!({ "id": "p1", "title": "First", "authorId": "u1", "tagIds": ["t1", "t2"] }),
            json!({ "id": "p2", "title": "Second", "authorId": "u1" }),
            json!({ "id": "p3", "title": "Orphan" }),
        ],
    );
    driver.seed(
        "tags",
        [json!({ "id": "t1", "label": "rust" }), json!({ "id": "t2", "label": "db" })],
    );

    Blog {
        _merlin: merlin,
        driver,
        users,
        posts,
        tags,
    }
}

fn blog() -> Blog {
    blog_with(Config::default())
}

fn titles(sub_model: Option<&SubModel>) -> Vec<serde_json::Value> {
    sub_model
        .map(|sub_model| {
            sub_model
                .models()
                .map(|model| model.get("title").unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn declarations_are_mirrored() {
    let blog = blog();

    let relations = blog.posts.relations().unwrap();
    assert_eq!(relations["authorId"].kind, RelationKind::ManyToOne);
    assert_eq!(relations["authorId"].field_path, "author");
    assert_eq!(relations["authorId"].foreign_field_path, "posts");
    assert_eq!(relations["tagIds"].field_path, "tags");

    let references = blog.users.references().unwrap();
    assert_eq!(references["Post"]["authorId"].model_name, "Post");

    assert!(blog.tags.relations().unwrap().is_empty());
}

#[test]
fn declaring_against_an_unknown_model_fails() {
    let blog = blog();

    assert!(matches!(
        blog.posts.has_one("Comment", "comment"),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn belongs_to_declares_on_the_foreign_type() {
    let (merlin, _driver) = setup();
    let users = merlin.model("User", ModelDefinition::new()).unwrap();
    let profiles = merlin.model("Profile", ModelDefinition::new()).unwrap();

    let descriptor = users
        .belongs_to_one("Profile", RelationOptions::new().foreign_field_path("owner"))
        .unwrap();

    assert_eq!(descriptor.model_name, "User");
    assert_eq!(descriptor.key_path, "userId");
    assert_eq!(descriptor.foreign_field_path, "owner");

    assert!(profiles.relations().unwrap().contains_key("userId"));
    assert_eq!(users.resolve("owner").unwrap().target.name(), "Profile");
}

#[tokio::test]
async fn sub_queries_populate_relations() {
    let blog = blog();

    let posts = blog
        .posts
        .find(json!({ "author": {} }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(posts.len(), 3);

    let Some(SubModel::Model(author)) = posts[0].sub_model("author") else {
        panic!("author not attached");
    };
    assert_eq!(author.get("name"), Some(json!("Kit")));
    assert!(!author.is_new());

    let Some(SubModel::Set(tags)) = posts[0].sub_model("tags") else {
        panic!("tags not attached");
    };
    assert_eq!(tags.len(), 2);

    let mut first = posts[0].clone();
    if let Some(SubModel::Model(author)) = first.sub_model_mut("author") {
        author.set("name", "Kitty").unwrap();
    }
    assert_eq!(first.record_with_sub_records()["author"]["name"], json!("Kitty"));

    assert!(posts[2].sub_model("author").is_none());
    assert_eq!(posts[2].sub_model("tags").map(|tags| tags.models().len()), Some(0));
    assert_eq!(posts[2].record().get("author"), None);

    let find_calls = blog.driver.calls_to("find");
    assert_eq!(find_calls[0].query, json!({}));
    assert!(
        find_calls.iter().any(|call| {
            call.collection == "tags" && call.query == json!({ "id": { "$in": ["t1", "t2"] } })
        })
    );
    assert!(
        find_calls
            .iter()
            .any(|call| call.collection == "users" && call.limit == Some(1))
    );
}

#[tokio::test]
async fn missing_keys_skip_the_lookup() {
    let blog = blog();

    blog.posts
        .find(json!({ "id": "p3", "author": true }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(blog.driver.calls_to("find").len(), 1);
}

#[tokio::test]
async fn sub_queries_populate_references_and_narrow_them() {
    let blog = blog();

    let users = blog
        .users
        .find(json!({ "posts": { "title": "Second" } }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(titles(users[0].sub_model("posts")), [json!("Second")]);
    assert!(titles(users[1].sub_model("posts")).is_empty());

    let lookup = blog
        .driver
        .calls_to("find")
        .into_iter()
        .find(|call| call.collection == "posts")
        .unwrap();
    assert_eq!(lookup.query, json!({ "title": "Second", "authorId": "u1" }));
}

#[tokio::test]
async fn raw_finds_attach_plain_records() {
    let blog = blog();

    let posts = blog
        .posts
        .find_as::<merlin::Record>(json!({ "id": "p1", "author": true }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(posts[0]["author"], json!({ "id": "u1", "name": "Kit" }));
    assert_eq!(posts[0]["tags"][1]["label"], json!("db"));
}

#[tokio::test]
async fn population_can_be_switched_off() {
    let blog = blog_with(Config::default().with_auto_populate_by_query(false));

    let posts = blog
        .posts
        .find(json!({ "title": "First", "author": {} }), Options::default())
        .all()
        .await
        .unwrap();

    assert_eq!(posts.len(), 1);
    assert!(posts[0].sub_models().is_empty());
    assert_eq!(blog.driver.calls_to("find").len(), 1);
    assert_eq!(blog.driver.calls_to("find")[0].query, json!({ "title": "First" }));
}

#[tokio::test]
async fn load_related_attaches_one_path() {
    let blog = blog();

    let mut kit = blog.users.find_by_id("u1", Options::default()).await.unwrap().unwrap();

    let posts = kit.load_related("posts").await.unwrap();
    assert_eq!(titles(posts), [json!("First"), json!("Second")]);

    let mut orphan = blog.posts.find_by_id("p3", Options::default()).await.unwrap().unwrap();
    assert!(orphan.load_related("author").await.unwrap().is_none());

    assert!(matches!(
        kit.load_related("friends").await,
        Err(Error::PathNotFound { path, .. }) if path == "friends"
    ));
}

#[tokio::test]
async fn sub_records_are_pruned_on_insert() {
    let blog = blog();

    blog.posts
        .create(
            json!({ "title": "New", "author": { "name": "Ann" } }),
            Options::default(),
        )
        .await
        .unwrap();

    let stored = blog.driver.records("posts");
    assert_eq!(stored.last().unwrap().get("author"), None);
}

#[tokio::test]
async fn save_all_saves_relations_before_the_owner() {
    let blog = blog();

    let mut post = blog
        .posts
        .build(json!({
            "title": "Draft",
            "author": { "name": "Ann" },
            "tags": [{ "label": "new" }, { "id": "t1", "label": "rust" }],
        }))
        .unwrap();

    post.save_all().await.unwrap();

    let inserts = blog
        .driver
        .calls_to("insert")
        .into_iter()
        .map(|call| call.collection)
        .collect::<Vec<_>>();
    assert_eq!(inserts, ["users", "tags", "posts"]);

    let Some(SubModel::Model(author)) = post.sub_model("author") else {
        panic!("author not attached");
    };
    let author_id = author.id().cloned().unwrap();

    let stored = blog.driver.records("posts").last().cloned().unwrap();
    assert_eq!(stored["authorId"], author_id);
    assert_eq!(stored["tagIds"][1], json!("t1"));
    assert_eq!(stored.get("author"), None);
}

#[tokio::test]
async fn save_all_links_references_after_the_owner() {
    let blog = blog();

    let mut ann = blog
        .users
        .build(json!({ "name": "Ann", "posts": [{ "title": "Hello" }, { "title": "Again" }] }))
        .unwrap();

    ann.save_all().await.unwrap();

    let inserts = blog
        .driver
        .calls_to("insert")
        .into_iter()
        .map(|call| call.collection)
        .collect::<Vec<_>>();
    assert_eq!(inserts, ["users", "posts", "posts"]);

    let ann_id = ann.id().cloned().unwrap();
    let posts = blog.driver.records("posts");
    assert!(
        posts
            .iter()
            .filter(|post| post["title"] == json!("Hello") || post["title"] == json!("Again"))
            .all(|post| post["authorId"] == ann_id)
    );
}

#[tokio::test]
async fn remove_all_removes_sub_models_first() {
    let blog = blog();

    let mut kit = blog
        .users
        .find_one(json!({ "id": "u1", "posts": true }), Options::default())
        .await
        .unwrap()
        .unwrap();

    kit.remove_all().await.unwrap();

    let removes = blog
        .driver
        .calls_to("remove")
        .into_iter()
        .map(|call| (call.collection, call.query))
        .collect::<Vec<_>>();
    assert_eq!(
        removes,
        [
            ("posts".to_owned(), json!({ "id": "p1" })),
            ("posts".to_owned(), json!({ "id": "p2" })),
            ("users".to_owned(), json!({ "id": "u1" })),
        ]
    );

    assert_eq!(blog.driver.records("posts").len(), 1);
    assert_eq!(blog.driver.records("users").len(), 1);
    assert!(kit.is_new());
}

#[tokio::test]
async fn detached_sub_models_are_not_saved() {
    let blog = blog();

    let mut post = blog
        .posts
        .build(json!({ "title": "Draft", "author": { "name": "Ann" } }))
        .unwrap();

    assert!(post.detach("author").is_some());
    post.save_all().await.unwrap();

    assert!(blog.driver.records("users").iter().all(|user| user["name"] != json!("Ann")));
    assert_eq!(
        post.get("author"),
        None,
        "nothing is attached and the record has no author field"
    );
}
