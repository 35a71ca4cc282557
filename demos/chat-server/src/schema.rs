//! Chat schema wired to the store.

use crate::store::ChatStore;
use serde::Serialize;
use serde_json::{json, Value};
use shapeql_runtime::{
    AsyncFnResolver, FieldDef, FnResolver, InputFieldDef, Resolved, ResolverError, Schema,
    SchemaBuilder, SchemaError, TypeRef,
};
use std::sync::Arc;

fn to_value(value: &impl Serialize) -> Result<Value, ResolverError> {
    serde_json::to_value(value).map_err(|error| ResolverError::Internal(error.to_string()))
}

pub fn build(store: &Arc<ChatStore>) -> Result<Schema, SchemaError> {
    let mut builder = SchemaBuilder::new();

    builder
        .add_type("User")?
        .field(FieldDef::new("id", TypeRef::named("ID")))?
        .field(FieldDef::new("name", TypeRef::named("String")))?
        .field(FieldDef::new("bio", TypeRef::named("String")).description("Absent for most users"))?;

    let authors = Arc::clone(store);
    builder
        .add_type("Message")?
        .field(FieldDef::new("id", TypeRef::named("ID")))?
        .field(FieldDef::new("text", TypeRef::named("String")))?
        .field(
            FieldDef::new("author", TypeRef::named("User")).resolver(FnResolver::new(
                move |message, _, _| {
                    let name = message["user"].as_str().unwrap_or_default();
                    match authors.user(name) {
                        Some(user) => Ok(to_value(user)?.into()),
                        None => Ok(Resolved::absent()),
                    }
                },
            )),
        )?;

    builder
        .add_input_type("EditInput")?
        .field(InputFieldDef::new("id", TypeRef::named("Int")).required())?
        .field(InputFieldDef::new("text", TypeRef::named("String")).required())?;

    let users = Arc::clone(store);
    let user = Arc::clone(store);
    let messages = Arc::clone(store);
    builder
        .add_type("Query")?
        .field(
            FieldDef::new("users", TypeRef::list(TypeRef::named("User"))).resolver(
                FnResolver::new(move |_, _, _| {
                    let all = users
                        .users()
                        .iter()
                        .map(to_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(Resolved::seq(all))
                }),
            ),
        )?
        .field(
            FieldDef::new("user", TypeRef::named("User"))
                .argument(InputFieldDef::new("name", TypeRef::named("String")).required())
                .resolver(FnResolver::new(move |_, args, _| {
                    let name: String = args.require("name")?;
                    match user.user(&name) {
                        Some(found) => Ok(to_value(found)?.into()),
                        None => Ok(Resolved::absent()),
                    }
                })),
        )?
        .field(
            FieldDef::new("messages", TypeRef::list(TypeRef::named("Message")))
                .argument(InputFieldDef::new("user", TypeRef::named("String")))
                .argument(InputFieldDef::new("limit", TypeRef::named("Int")).with_default(json!(20)))
                .resolver(AsyncFnResolver::new(move |_, args, _| {
                    let store = Arc::clone(&messages);
                    async move {
                        let user = args.get_as::<String>("user");
                        let limit: usize = args.require("limit")?;
                        let found = store
                            .messages(user.as_deref(), limit)
                            .await
                            .iter()
                            .map(to_value)
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Resolved::seq(found))
                    }
                })),
        )?;

    let poster = Arc::clone(store);
    let editor = Arc::clone(store);
    builder
        .add_type("Mutation")?
        .field(
            FieldDef::new("postMessage", TypeRef::named("Message"))
                .argument(InputFieldDef::new("message", TypeRef::named("String")).required())
                .argument(InputFieldDef::new("user", TypeRef::named("String")).required())
                .resolver(AsyncFnResolver::new(move |_, args, _| {
                    let store = Arc::clone(&poster);
                    async move {
                        let text: String = args.require("message")?;
                        let user: String = args.require("user")?;
                        let message = store.post(&text, &user).await?;
                        Ok(to_value(&message)?.into())
                    }
                })),
        )?
        .field(
            FieldDef::new("editMessage", TypeRef::named("Message"))
                .argument(InputFieldDef::new("input", TypeRef::named("EditInput")).required())
                .resolver(AsyncFnResolver::new(move |_, args, _| {
                    let store = Arc::clone(&editor);
                    async move {
                        let input = args.get("input").cloned().unwrap_or_default();
                        let id = input["id"].as_i64().unwrap_or_default();
                        let text = input["text"].as_str().unwrap_or_default();
                        let message = store.edit(id, text).await?;
                        Ok(to_value(&message)?.into())
                    }
                })),
        )?;

    builder
        .add_type("Subscription")?
        .field(
            FieldDef::new("onMessage", TypeRef::named("Message"))
                .description("Every message posted after subscribing")
                .event_source(store.events().clone()),
        )?;

    builder.build()
}
