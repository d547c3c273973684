use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use jobflow::{Flow, Node, Outcome, Prepared, SharedContext};

struct Greet;

#[async_trait]
impl Node for Greet {
    fn name(&self) -> &str {
        "greet"
    }

    async fn exec(&self, _prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        Ok(json!("hello, jobflow"))
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("greeting", result);
        Ok(Outcome::default())
    }
}

struct Shout;

#[async_trait]
impl Node for Shout {
    fn name(&self) -> &str {
        "shout"
    }

    async fn prep(&self, ctx: &SharedContext) -> jobflow::Result<Prepared> {
        Ok(Prepared::Value(ctx.require(self.name(), "greeting")?))
    }

    async fn exec(&self, prep: &Prepared, _attempt: u32) -> jobflow::Result<Value> {
        let text = prep.value().and_then(Value::as_str).unwrap_or_default();
        Ok(json!(text.to_uppercase()))
    }

    async fn post(
        &self,
        ctx: &SharedContext,
        _prep: Prepared,
        result: Value,
    ) -> jobflow::Result<Outcome> {
        ctx.insert("shouted", result);
        Ok(Outcome::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut builder = Flow::builder("minimal");
    builder
        .node("greet", Arc::new(Greet))
        .node("shout", Arc::new(Shout))
        .start("greet")
        .connect("greet", "shout");
    let flow = builder.build()?;

    let ctx = flow.execute(SharedContext::new()).await?;
    println!("greeting: {}", ctx.get("greeting").unwrap_or_default());
    println!("shouted:  {}", ctx.get("shouted").unwrap_or_default());
    Ok(())
}
