//! Shared chat schema for integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use shapeql_runtime::{
    Broadcaster, Engine, EngineConfig, FieldDef, FnResolver, InputFieldDef, Resolved,
    ResolverError, SchemaBuilder, TypeRef,
};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct ChatStore {
    pub people: Vec<Value>,
    pub messages: Mutex<Vec<Value>>,
    pub next_id: AtomicI64,
    pub events: Broadcaster<Value>,
    pub name_reads: AtomicUsize,
}

impl ChatStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            people: vec![
                json!({ "id": 1, "name": "Ann" }),
                json!({ "id": 2, "name": "Bob" }),
            ],
            messages: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            events: Broadcaster::new(),
            name_reads: AtomicUsize::new(0),
        })
    }

    pub fn post(&self, text: &str, user: &str) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({ "id": id, "text": text, "user": user });
        self.messages.lock().unwrap().push(message.clone());
        let _ = self.events.publish(message.clone());
        message
    }
}

pub fn chat_engine(config: EngineConfig) -> (Engine, Arc<ChatStore>) {
    let store = ChatStore::new();
    let mut builder = SchemaBuilder::new();

    let reads = Arc::clone(&store);
    builder
        .add_type("Person")
        .unwrap()
        .field(FieldDef::new("id", TypeRef::named("Int")))
        .unwrap()
        .field(
            FieldDef::new("name", TypeRef::named("String")).resolver(
                FnResolver::new(move |person, _, _| {
                    reads.name_reads.fetch_add(1, Ordering::SeqCst);
                    Ok(person["name"].clone().into())
                })
                .on_type("Person"),
            ),
        )
        .unwrap();

    let authors = Arc::clone(&store);
    builder
        .add_type("Message")
        .unwrap()
        .field(FieldDef::new("id", TypeRef::named("Int")))
        .unwrap()
        .field(FieldDef::new("text", TypeRef::named("String")))
        .unwrap()
        .field(FieldDef::new("user", TypeRef::named("String")))
        .unwrap()
        .field(FieldDef::new("pinned", TypeRef::named("Boolean")))
        .unwrap()
        .field(
            FieldDef::new("author", TypeRef::named("Person")).resolver(FnResolver::new(
                move |message, _, _| {
                    let author = authors
                        .people
                        .iter()
                        .find(|p| p["name"] == message["user"])
                        .cloned()
                        .unwrap_or(Value::Null);
                    Ok(author.into())
                },
            )),
        )
        .unwrap();

    builder
        .add_input_type("MessagePatch")
        .unwrap()
        .field(InputFieldDef::new("id", TypeRef::named("Int")).required())
        .unwrap()
        .field(InputFieldDef::new("text", TypeRef::named("String")))
        .unwrap()
        .field(InputFieldDef::new("pinned", TypeRef::named("Boolean")).with_default(json!(false)))
        .unwrap();

    let people = Arc::clone(&store);
    let person = Arc::clone(&store);
    let messages = Arc::clone(&store);
    builder
        .add_type("Query")
        .unwrap()
        .field(
            FieldDef::new("people", TypeRef::list(TypeRef::named("Person"))).resolver(
                FnResolver::new(move |_, _, _| Ok(Resolved::seq(people.people.clone()))),
            ),
        )
        .unwrap()
        .field(
            FieldDef::new("person", TypeRef::named("Person"))
                .argument(InputFieldDef::new("id", TypeRef::named("Int")).required())
                .resolver(FnResolver::new(move |_, args, _| {
                    let id: i64 = args.require("id")?;
                    Ok(person
                        .people
                        .iter()
                        .find(|p| p["id"] == id)
                        .cloned()
                        .map_or_else(Resolved::absent, Resolved::Value))
                })),
        )
        .unwrap()
        .field(
            FieldDef::new("messages", TypeRef::list(TypeRef::named("Message")))
                .argument(InputFieldDef::new("user", TypeRef::named("String")))
                .argument(InputFieldDef::new("limit", TypeRef::named("Int")).with_default(json!(10)))
                .resolver(FnResolver::new(move |_, args, _| {
                    let user = args.get_as::<String>("user");
                    let limit: usize = args.require("limit")?;
                    let found: Vec<Value> = messages
                        .messages
                        .lock()
                        .unwrap()
                        .iter()
                        .filter(|m| user.as_deref().map_or(true, |u| m["user"] == u))
                        .take(limit)
                        .cloned()
                        .collect();
                    Ok(Resolved::seq(found))
                })),
        )
        .unwrap()
        .field(
            FieldDef::new("broken", TypeRef::named("Int"))
                .resolver(FnResolver::new(|_, _, _| Err(ResolverError::custom("store offline")))),
        )
        .unwrap();

    let poster = Arc::clone(&store);
    let editor = Arc::clone(&store);
    builder
        .add_type("Mutation")
        .unwrap()
        .field(
            FieldDef::new("postMessage", TypeRef::named("Message"))
                .argument(InputFieldDef::new("message", TypeRef::named("String")).required())
                .argument(InputFieldDef::new("user", TypeRef::named("String")).required())
                .resolver(FnResolver::new(move |_, args, _| {
                    let text: String = args.require("message")?;
                    let user: String = args.require("user")?;
                    Ok(poster.post(&text, &user).into())
                })),
        )
        .unwrap()
        .field(
            FieldDef::new("editMessage", TypeRef::named("Message"))
                .argument(InputFieldDef::new("patch", TypeRef::named("MessagePatch")).required())
                .resolver(FnResolver::new(move |_, args, _| {
                    let patch = args.get("patch").cloned().unwrap_or(Value::Null);
                    let mut messages = editor.messages.lock().unwrap();
                    let Some(message) = messages.iter_mut().find(|m| m["id"] == patch["id"]) else {
                        return Ok(Resolved::absent());
                    };
                    for field in ["text", "pinned"] {
                        if args.input_is_set("patch", field) {
                            message[field] = patch[field].clone();
                        }
                    }
                    Ok(message.clone().into())
                })),
        )
        .unwrap();

    builder
        .add_type("Subscription")
        .unwrap()
        .field(
            FieldDef::new("onMessage", TypeRef::named("Message"))
                .event_source(store.events.clone()),
        )
        .unwrap();

    let schema = builder.build().unwrap();
    (Engine::with_config(schema, config), store)
}
