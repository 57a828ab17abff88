use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_adapters::traits::{
    AdapterMetadata, AdapterResult, CompletionRequest, MessageRole, ModelAdapter, PromptMessage,
};
use agent_kernel::{
    Agent, AgentError, CompletionObserver, Query, RunOptions, ToolCallingAgent,
};
use agent_ranking::{KeywordRanker, RankingError, RankingResult, ToolDescriptor, ToolRanker};
use agent_tools::{
    ParamType, ToolArguments, ToolError, ToolHandle, ToolMetadata, ToolParameter, ToolRegistry,
    ToolResult,
};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Replies with a canned completion and remembers every request.
struct ScriptedModel {
    metadata: AdapterMetadata,
    completion: String,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    fn new(completion: &str) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "fixture"),
            completion: completion.to_owned(),
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn slow(completion: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            metadata: AdapterMetadata::new("scripted", "fixture"),
            completion: completion.to_owned(),
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("model was called")
    }
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn complete(&self, request: CompletionRequest) -> AdapterResult<String> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.completion.clone())
    }
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<String>>,
}

impl CompletionObserver for RecordingObserver {
    fn on_completion(&self, _model: &AdapterMetadata, completion: &str) {
        self.seen.lock().unwrap().push(completion.to_owned());
    }
}

/// Ranker whose embedding backend is always down.
struct UnreachableRanker;

#[async_trait]
impl ToolRanker for UnreachableRanker {
    async fn rank(
        &self,
        _query: &str,
        _tools: &[ToolDescriptor],
        _top_k: usize,
    ) -> RankingResult<Vec<String>> {
        Err(RankingError::InvalidEmbedding("backend unreachable"))
    }
}

async fn convert_currency(args: ToolArguments) -> ToolResult<Value> {
    let amount = args["amount"].as_f64().unwrap_or_default();
    let from = args["from_currency"].as_str().unwrap_or_default();
    let to = args["to_currency"].as_str().unwrap_or_default();
    let rate = match (from, to) {
        ("USD", "EUR") => 0.9,
        ("EUR", "USD") => 1.1,
        _ => return Err(ToolError::execution(format!("no rate for {from}->{to}"))),
    };
    Ok(json!(format!("{:.2} {to}", amount * rate)))
}

async fn get_weather(args: ToolArguments) -> ToolResult<Value> {
    let location = args["location"].as_str().unwrap_or_default();
    Ok(json!(format!("Sunny in {location}")))
}

fn registry() -> ToolRegistry {
    let currency = ToolMetadata::new("convert_currency")
        .unwrap()
        .with_description("Converts a specified amount from one currency to another.")
        .with_parameter(ToolParameter::required("amount", ParamType::Number))
        .unwrap()
        .with_parameter(ToolParameter::required("from_currency", ParamType::String))
        .unwrap()
        .with_parameter(ToolParameter::required("to_currency", ParamType::String))
        .unwrap()
        .with_returns(ParamType::String);
    let weather = ToolMetadata::new("get_weather")
        .unwrap()
        .with_description("Get the current weather at a location.")
        .with_parameter(ToolParameter::required("location", ParamType::String))
        .unwrap()
        .with_returns(ParamType::String);

    ToolRegistry::register([
        ToolHandle::new(currency, convert_currency),
        ToolHandle::new(weather, get_weather),
    ])
    .unwrap()
}

fn system_message(request: &CompletionRequest) -> &str {
    let first = &request.messages()[0];
    assert_eq!(first.role(), MessageRole::System);
    first.content()
}

#[tokio::test]
async fn currency_query_produces_final_answer() {
    let model = ScriptedModel::new(
        "```python\nresult = convert_currency(100, \"USD\", \"EUR\")\n```",
    );
    let agent = Agent::new(model.clone(), registry());

    let results = agent
        .run(
            Query::from("How much is 100 USD in EUR?"),
            RunOptions::default().with_show_completion(false),
        )
        .await
        .unwrap();

    assert!(results.errors().is_empty());
    assert_eq!(results.get("result"), Some(&json!("90.00 EUR")));
    assert_eq!(results.final_answer().unwrap(), json!("90.00 EUR"));
    assert_eq!(results.to_compact(), json!({"result": "90.00 EUR"}));

    let request = model.last_request();
    assert!(system_message(&request).contains("def convert_currency("));
    assert_eq!(request.messages()[1].content(), "How much is 100 USD in EUR?");
    assert_eq!(request.temperature(), Some(0.0));
}

#[tokio::test]
async fn dry_run_returns_completion_untouched() {
    let completion = "```python\nconvert_currency(1, \"USD\", \"EUR\")\n```";
    let agent = Agent::new(ScriptedModel::new(completion), registry());

    let results = agent
        .run(Query::from("convert"), RunOptions::default().with_dry_run(true))
        .await
        .unwrap();

    assert!(results.is_dry());
    assert_eq!(results.content(), completion);
    assert!(results.data().is_empty());
    assert_eq!(results.final_answer().unwrap(), json!(completion));
    assert_eq!(results.to_compact(), json!({"content": completion}));
}

#[tokio::test]
async fn plain_text_completion_runs_nothing() {
    let agent = Agent::new(
        ScriptedModel::new("None of the tools can answer that."),
        registry(),
    );

    let results = agent
        .run(Query::from("tell me a story"), RunOptions::default())
        .await
        .unwrap();

    assert!(results.results().is_empty());
    assert!(results.data().is_empty());
    assert!(results.errors().is_empty());
    assert_eq!(results.content(), "None of the tools can answer that.");
    assert!(matches!(
        results.final_answer(),
        Err(AgentError::NoFinalValue)
    ));
}

#[tokio::test]
async fn failing_calls_do_not_stop_the_run() {
    let agent = Agent::new(
        ScriptedModel::new(
            "```\nweather = get_weather(\"Paris\")\nsend_email(\"bob\")\nconvert_currency(5, \"GBP\", \"JPY\")\n```",
        ),
        registry(),
    );

    let results = agent
        .run(Query::from("weather then email"), RunOptions::default())
        .await
        .unwrap();

    assert_eq!(results.data().len(), 1);
    assert_eq!(results.get("weather"), Some(&json!("Sunny in Paris")));
    assert_eq!(
        results.errors(),
        [
            "send_email: tool `send_email` is not registered".to_owned(),
            "convert_currency: tool execution failed: no rate for GBP->JPY".to_owned(),
        ]
    );
    assert_eq!(
        results.check_score(&[json!("Sunny in Paris")], &["get_weather"]),
        1.0
    );
}

#[tokio::test]
async fn ranker_narrows_advertised_tools() {
    let model = ScriptedModel::new("```\nget_weather(\"Oslo\")\n```");
    let agent = Agent::new(model.clone(), registry()).with_ranker(Arc::new(KeywordRanker::new()));

    agent
        .run(
            Query::from("What is the weather in Oslo?"),
            RunOptions::default().with_num_tools(1),
        )
        .await
        .unwrap();

    let request = model.last_request();
    let system = system_message(&request);
    assert!(system.contains("def get_weather("));
    assert!(!system.contains("def convert_currency("));
}

#[tokio::test]
async fn missing_ranker_advertises_every_tool() {
    let model = ScriptedModel::new("");
    let agent = Agent::new(model.clone(), registry());

    agent
        .run(Query::from("weather"), RunOptions::default().with_num_tools(1))
        .await
        .unwrap();

    let request = model.last_request();
    let system = system_message(&request);
    assert!(system.contains("def get_weather("));
    assert!(system.contains("def convert_currency("));
}

#[tokio::test]
async fn failing_ranker_advertises_every_tool() {
    let model = ScriptedModel::new("```\nget_weather(\"Oslo\")\n```");
    let agent = Agent::new(model.clone(), registry()).with_ranker(Arc::new(UnreachableRanker));

    let results = agent
        .run(
            Query::from("What is the weather in Oslo?"),
            RunOptions::default().with_num_tools(1),
        )
        .await
        .unwrap();
    assert_eq!(results.final_answer().unwrap(), json!("Sunny in Oslo"));

    let request = model.last_request();
    let system = system_message(&request);
    assert!(system.contains("def convert_currency("));
    assert!(system.contains("def get_weather("));
}

#[tokio::test]
async fn slow_completion_times_out() {
    let agent = Agent::new(
        ScriptedModel::slow("never", Duration::from_secs(5)),
        registry(),
    )
    .with_completion_timeout(Duration::from_millis(20));

    let err = agent
        .run(Query::from("anything"), RunOptions::default())
        .await
        .expect_err("completion outlives timeout");
    assert!(matches!(err, AgentError::CompletionTimeout { .. }));
}

#[tokio::test]
async fn conversation_gets_system_prompt_prepended() {
    let model = ScriptedModel::new("```\nget_weather(location=\"Rome\")\n```");
    let agent = Agent::new(model.clone(), registry());

    let results = agent
        .run(
            Query::from(vec![
                PromptMessage::user("Hi"),
                PromptMessage::new(MessageRole::Assistant, "Hello! How can I help?"),
                PromptMessage::user("Weather in Rome?"),
            ]),
            RunOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(results.final_answer().unwrap(), json!("Sunny in Rome"));
    let request = model.last_request();
    let roles: Vec<MessageRole> = request.messages().iter().map(PromptMessage::role).collect();
    assert_eq!(
        roles,
        [
            MessageRole::System,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User
        ]
    );
}

#[tokio::test]
async fn observer_sees_completion_only_when_shown() {
    let observer = Arc::new(RecordingObserver::default());
    let agent = Agent::new(ScriptedModel::new("plain answer"), registry())
        .with_observer(observer.clone());

    agent
        .run(
            Query::from("q"),
            RunOptions::default().with_show_completion(false),
        )
        .await
        .unwrap();
    assert!(observer.seen.lock().unwrap().is_empty());

    agent
        .run(Query::from("q"), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(*observer.seen.lock().unwrap(), ["plain answer".to_owned()]);
}
