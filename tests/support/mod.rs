//! Shared test harness for plan compilation and invocation
//!
//! Provides a blog schema whose resolvers can be registered either sync or
//! suspending, the static data behind it, and the interpretive reference
//! executor in [`oracle`] used for differential checks.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod support;
//! use support::*;
//! ```

#![allow(dead_code)]

pub mod oracle;

use anyhow::{Result, anyhow};
use chrono::DateTime;
use serde_json::{Value, json};
use std::sync::Arc;

use jit::prelude::*;

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

pub fn users() -> Vec<Value> {
    vec![
        json!({ "id": "u1", "name": "Ada", "email": "ada@example.com" }),
        json!({ "id": "u2", "name": "Grace", "email": null }),
    ]
}

pub fn posts() -> Vec<Value> {
    vec![
        json!({
            "id": "1", "title": "Post 1", "body": "Hello", "authorId": "u1",
            "tags": ["rust", "graphql"], "createdAt": 1700000000, "rating": "GOOD"
        }),
        json!({
            "id": "2", "title": "Post 2", "body": null, "authorId": "u2",
            "tags": ["rust"], "createdAt": 1700086400, "rating": "BAD"
        }),
        json!({
            "id": "3", "title": "Graphs", "body": "Edges", "authorId": "u1",
            "tags": [], "createdAt": "yesterday", "rating": null
        }),
    ]
}

pub fn comments() -> Vec<Value> {
    vec![
        json!({ "id": "c1", "postId": "1", "text": "Nice", "authorId": "u2" }),
        json!({ "id": "c2", "postId": "1", "text": "Who?", "authorId": "u404" }),
        json!({ "id": "c3", "postId": "2", "text": "+1", "authorId": "u1" }),
    ]
}

fn find(items: Vec<Value>, key: &str, value: &Value) -> Option<Value> {
    items.into_iter().find(|item| item.get(key) == Some(value))
}

fn tagged(value: Value, type_name: &str) -> Value {
    let mut value = value;
    if let Value::Object(map) = &mut value {
        map.insert("__typename".to_string(), json!(type_name));
    }
    value
}

/// Viewer identity stored in the request context
#[derive(Debug, Clone)]
pub struct Viewer(pub String);

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Registration variant used for every custom resolver of the fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Suspending,
}

pub const BLOG_SDL: &str = r#"
    scalar DateTime

    enum Rating { GOOD BAD }

    interface Node { id: ID! }

    type Query {
        posts(limit: Int = 10, tag: String): [Post!]!
        post(id: ID!): Post
        feed: [Post]
        search(term: String!): [SearchResult!]!
        node(id: ID!): Node
        viewer: User
        version: Int!
        broken: String
        brokenRequired: String!
    }

    type Mutation {
        createPost(title: String!, tags: [String!] = []): Post!
        deletePost(id: ID!): Boolean!
    }

    type Post implements Node {
        id: ID!
        title: String!
        body: String
        author: User
        comments: [Comment!]!
        tags: [String!]
        createdAt: DateTime
        rating: Rating
    }

    type User implements Node {
        id: ID!
        name: String!
        email: String
        posts: [Post!]!
    }

    type Comment {
        id: ID!
        text: String!
        author: User
    }

    union SearchResult = Post | User
"#;

/// Wrap a sync closure as a resolver of the requested mode
pub fn resolver<F>(mode: Mode, resolve: F) -> Resolver
where
    F: Fn(ResolverArgs) -> Result<Value> + Send + Sync + 'static,
{
    match mode {
        Mode::Sync => Resolver::sync(resolve),
        Mode::Suspending => {
            let resolve = Arc::new(resolve);
            Resolver::suspending(move |args| {
                let resolve = Arc::clone(&resolve);
                async move {
                    tokio::task::yield_now().await;
                    resolve(args)
                }
            })
        }
    }
}

fn date_time_serializer() -> ScalarSerializer {
    ScalarSerializer::new(|value| match value.as_i64() {
        Some(seconds) => DateTime::from_timestamp(seconds, 0)
            .map(|at| json!(at.to_rfc3339()))
            .ok_or_else(|| anyhow!("DateTime cannot represent timestamp {}", seconds)),
        None => Err(anyhow!("DateTime cannot represent value: {}", value)),
    })
}

fn node_type_resolver() -> TypeResolver {
    TypeResolver::new(|value| {
        if value.get("title").is_some() {
            Some("Post".to_string())
        } else if value.get("name").is_some() {
            Some("User".to_string())
        } else {
            None
        }
    })
}

/// Blog schema with every resolver registered as `mode`
pub fn blog_schema(mode: Mode) -> SchemaRegistry {
    blog_builder(mode, "blog")
        .build()
        .expect("blog schema builds")
}

pub fn blog_builder(mode: Mode, id: &str) -> SchemaBuilder {
    SchemaBuilder::from_sdl(SchemaId::new(id), BLOG_SDL)
        .and_then(|builder| builder.serializer("DateTime", date_time_serializer()))
        .and_then(|builder| builder.type_resolver("Node", node_type_resolver()))
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "posts",
                resolver(mode, |args| {
                    let limit = args.arg_as::<usize>("limit")?.unwrap_or(usize::MAX);
                    let tag = args.arg_as::<String>("tag")?;
                    Ok(Value::Array(
                        posts()
                            .into_iter()
                            .filter(|post| match &tag {
                                Some(tag) => post["tags"]
                                    .as_array()
                                    .is_some_and(|tags| tags.contains(&json!(tag))),
                                None => true,
                            })
                            .take(limit)
                            .collect(),
                    ))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "post",
                resolver(mode, |args| {
                    let id = args.arg("id").cloned().unwrap_or(Value::Null);
                    Ok(find(posts(), "id", &id).unwrap_or(Value::Null))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "feed",
                resolver(mode, |_| {
                    let posts = posts();
                    Ok(json!([posts[0], null, posts[1]]))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "search",
                resolver(mode, |args| {
                    let term = args.arg_as::<String>("term")?.unwrap_or_default();
                    let mut results: Vec<Value> = posts()
                        .into_iter()
                        .filter(|post| post["title"].as_str().is_some_and(|t| t.contains(&term)))
                        .map(|post| tagged(post, "Post"))
                        .collect();
                    results.extend(
                        users()
                            .into_iter()
                            .filter(|user| user["name"].as_str().is_some_and(|n| n.contains(&term)))
                            .map(|user| tagged(user, "User")),
                    );
                    Ok(Value::Array(results))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "node",
                resolver(mode, |args| {
                    let id = args.arg("id").cloned().unwrap_or(Value::Null);
                    Ok(find(posts(), "id", &id)
                        .or_else(|| find(users(), "id", &id))
                        .unwrap_or(Value::Null))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "viewer",
                resolver(mode, |args| {
                    Ok(match args.context.data::<Viewer>() {
                        Some(Viewer(id)) => find(users(), "id", &json!(id)).unwrap_or(Value::Null),
                        None => Value::Null,
                    })
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver("Query", "broken", resolver(mode, |_| Err(anyhow!("boom"))))
        })
        .and_then(|builder| {
            builder.resolver(
                "Query",
                "brokenRequired",
                resolver(mode, |_| Err(anyhow!("required boom"))),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Mutation",
                "createPost",
                resolver(mode, |args| {
                    let title = args.arg_as::<String>("title")?.unwrap_or_default();
                    Ok(json!({
                        "id": format!("new-{}", title.to_lowercase().replace(' ', "-")),
                        "title": title,
                        "tags": args.arg("tags").cloned().unwrap_or(Value::Null),
                        "authorId": "u1",
                    }))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Mutation",
                "deletePost",
                resolver(mode, |args| {
                    let id = args.arg("id").cloned().unwrap_or(Value::Null);
                    Ok(json!(find(posts(), "id", &id).is_some()))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Post",
                "author",
                resolver(mode, |args| {
                    Ok(find(users(), "id", &args.parent["authorId"]).unwrap_or(Value::Null))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Post",
                "comments",
                resolver(mode, |args| {
                    let post_id = args.parent["id"].clone();
                    Ok(Value::Array(
                        comments()
                            .into_iter()
                            .filter(|comment| comment["postId"] == post_id)
                            .collect(),
                    ))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "Comment",
                "author",
                resolver(mode, |args| {
                    let author_id = &args.parent["authorId"];
                    find(users(), "id", author_id)
                        .ok_or_else(|| anyhow!("User {} not found", author_id))
                }),
            )
        })
        .and_then(|builder| {
            builder.resolver(
                "User",
                "posts",
                resolver(mode, |args| {
                    let user_id = args.parent["id"].clone();
                    Ok(Value::Array(
                        posts()
                            .into_iter()
                            .filter(|post| post["authorId"] == user_id)
                            .collect(),
                    ))
                }),
            )
        })
        .expect("blog resolvers attach")
}

/// Root value handed to the blog schema
pub fn blog_root() -> Value {
    json!({ "version": 3 })
}

pub fn vars(value: Value) -> Variables {
    value.as_object().cloned().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Differential helpers
// ---------------------------------------------------------------------------

/// Compile and invoke `query`, then compare with the reference executor
///
/// Returns the compiled result for further assertions.
pub async fn assert_matches_oracle(
    registry: &SchemaRegistry,
    query: &str,
    root: &Value,
    context: &Context,
    variables: &Variables,
) -> ExecutionResult {
    let plan = compile_query(registry, query, None).expect("query compiles");
    let compiled = plan.invoke(root, context, variables).await;
    let expected = oracle::execute(registry, query, None, root, context, variables).await;

    assert_eq!(
        serde_json::to_value(&compiled).unwrap(),
        serde_json::to_value(&expected).unwrap(),
        "compiled and reference results differ for {}",
        query
    );
    compiled
}
