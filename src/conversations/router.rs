use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::actions::{ActionHandler, ActionOutcome, TurnContext};
use super::clarification::{forces_clarification, ClarificationGate};
use super::intent::IntentClassifier;
use super::types::{user_turns, IntentResult, ResponseType, RoutingDecision, TurnRequest, TurnResponse};

/// Per-turn router state. Every turn starts in `Routing`, visits exactly one
/// handler state and ends in `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Routing,
    DocumentLookup,
    FormLookup,
    AgencyHandoff,
    Advisory,
    Done,
}

impl RouterState {
    fn handler_kind(self) -> Option<ResponseType> {
        match self {
            RouterState::DocumentLookup => Some(ResponseType::DocumentLookup),
            RouterState::FormLookup => Some(ResponseType::FormLookup),
            RouterState::AgencyHandoff => Some(ResponseType::AgencyHandoff),
            RouterState::Advisory => Some(ResponseType::Advisory),
            RouterState::Routing | RouterState::Done => None,
        }
    }
}

/// The `Routing` transition. Lookups need the gate's consent; a hand-off
/// needs an agency requirement and no agency chosen yet.
pub fn decide(intent: &IntentResult, gate_allows: bool, agency_selected: bool) -> RouterState {
    match intent.response_type {
        ResponseType::DocumentLookup if gate_allows => RouterState::DocumentLookup,
        ResponseType::FormLookup if gate_allows => RouterState::FormLookup,
        ResponseType::AgencyHandoff if intent.needs_agency && !agency_selected => RouterState::AgencyHandoff,
        _ => RouterState::Advisory,
    }
}

pub struct ResponseRouter {
    classifier: IntentClassifier,
    gate: ClarificationGate,
    advisory: Arc<dyn ActionHandler>,
    handlers: Vec<Arc<dyn ActionHandler>>,
    max_clarification_turns: usize,
}

impl ResponseRouter {
    pub fn new(
        classifier: IntentClassifier,
        gate: ClarificationGate,
        advisory: Arc<dyn ActionHandler>,
        handlers: Vec<Arc<dyn ActionHandler>>,
        max_clarification_turns: usize,
    ) -> Self {
        Self { classifier, gate, advisory, handlers, max_clarification_turns }
    }

    /// Classify, gate and answer one user turn. Always yields a response.
    pub async fn route(&self, request: &TurnRequest) -> TurnResponse {
        let span = info_span!("turn", turn_id = %Uuid::new_v4());
        async move {
            let intent = self.classifier.classify(request).await;
            self.dispatch(request, intent).await
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn dispatch(&self, request: &TurnRequest, intent: IntentResult) -> TurnResponse {
        let turn_count = user_turns(&request.context);
        let mut state = RouterState::Routing;
        let mut clarify = false;
        let mut served = ResponseType::Advisory;
        let mut outcome = ActionOutcome::default();

        loop {
            state = match state {
                RouterState::Routing => {
                    let gated = intent.response_type.is_lookup();
                    let allowed = gated
                        && self
                            .gate
                            .should_act(
                                &request.message,
                                &request.context,
                                intent.response_type,
                                turn_count,
                                self.max_clarification_turns,
                            )
                            .await;
                    clarify = (gated && !allowed) || forces_clarification(&request.message, turn_count);
                    let next = decide(&intent, allowed, request.selected_agency.is_some());
                    debug!("[router] {:?} (turn {}) -> {:?}", intent.response_type, turn_count, next);
                    next
                }
                RouterState::Done => break,
                handler_state => {
                    let candidate = TurnContext { request, intent: &intent, clarify };
                    let handler = self.handler_for(handler_state, &candidate);
                    served = handler.kind();
                    // Only an advisory answer can ask for clarification.
                    clarify &= served == ResponseType::Advisory;
                    let turn = TurnContext { request, intent: &intent, clarify };
                    outcome = handler.handle(&turn).await;
                    RouterState::Done
                }
            };
        }

        info!("[router] answered with {:?} (clarify: {})", served, clarify);
        TurnResponse {
            response: outcome.text,
            routing: RoutingDecision { response_type: served, should_clarify: clarify },
            intent,
            documents: outcome.documents,
            agency: outcome.agency,
            follow_up_questions: outcome.follow_up_questions,
        }
    }

    fn handler_for(&self, state: RouterState, turn: &TurnContext<'_>) -> &Arc<dyn ActionHandler> {
        let Some(kind) = state.handler_kind().filter(|k| *k != ResponseType::Advisory) else {
            return &self.advisory;
        };
        match self.handlers.iter().find(|h| h.kind() == kind) {
            Some(handler) if handler.accepts(turn) => handler,
            Some(_) => {
                debug!("[router] {:?} handler declined, falling back to advisory", kind);
                &self.advisory
            }
            None => {
                warn!("[router] no {:?} handler registered, falling back to advisory", kind);
                &self.advisory
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::CompletionSettings;
    use crate::conversations::actions::{AdvisoryChatHandler, RetrievalLookupHandler};
    use crate::conversations::agency_directory::AgencyDirectory;
    use crate::conversations::types::{Category, Message};
    use crate::testing::{record, ScriptedCompletion, StaticRetrieval};

    struct CountingHandler {
        kind: ResponseType,
        accepts: bool,
        calls: AtomicUsize,
    }

    impl CountingHandler {
        fn new(kind: ResponseType, accepts: bool) -> Arc<Self> {
            Arc::new(Self { kind, accepts, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionHandler for CountingHandler {
        fn kind(&self) -> ResponseType {
            self.kind
        }

        fn accepts(&self, _turn: &TurnContext<'_>) -> bool {
            self.accepts
        }

        async fn handle(&self, _turn: &TurnContext<'_>) -> ActionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ActionOutcome::text(format!("{:?}", self.kind))
        }
    }

    fn request(message: &str, turns: usize, selected_agency: Option<&str>) -> TurnRequest {
        let context = (0..turns)
            .flat_map(|i| [Message::user(format!("earlier question {i}")), Message::assistant("Could you tell me more?")])
            .collect();
        TurnRequest {
            message: message.into(),
            context,
            country: "Vietnam".into(),
            language: "English".into(),
            selected_agency: selected_agency.map(str::to_string),
        }
    }

    fn intent(response_type: ResponseType, needs_agency: bool) -> IntentResult {
        IntentResult {
            category: Some(Category::Housing),
            needs_agency,
            suggested_agencies: vec![],
            response_type,
            reasoning: String::new(),
        }
    }

    fn settings() -> CompletionSettings {
        CompletionSettings::new(0.1, 150)
    }

    fn classifier(completion: Arc<ScriptedCompletion>) -> IntentClassifier {
        IntentClassifier::new(completion, Arc::new(AgencyDirectory::builtin()), settings())
    }

    #[test]
    fn routing_transitions() {
        let doc = intent(ResponseType::DocumentLookup, false);
        assert_eq!(decide(&doc, true, false), RouterState::DocumentLookup);
        assert_eq!(decide(&doc, false, false), RouterState::Advisory);

        let form = intent(ResponseType::FormLookup, false);
        assert_eq!(decide(&form, true, true), RouterState::FormLookup);

        let handoff = intent(ResponseType::AgencyHandoff, true);
        assert_eq!(decide(&handoff, false, false), RouterState::AgencyHandoff);
        assert_eq!(decide(&handoff, false, true), RouterState::Advisory);
        assert_eq!(decide(&intent(ResponseType::AgencyHandoff, false), true, false), RouterState::Advisory);

        assert_eq!(decide(&intent(ResponseType::Advisory, false), true, false), RouterState::Advisory);
    }

    #[tokio::test]
    async fn exactly_one_handler_runs_per_turn() {
        let types = [
            ResponseType::DocumentLookup,
            ResponseType::FormLookup,
            ResponseType::AgencyHandoff,
            ResponseType::Advisory,
        ];
        for response_type in types {
            for needs_agency in [false, true] {
                for selected in [None, Some("Ministry of Construction")] {
                    for turns in 0..=6 {
                        for verdict in ["yes", "no", "maybe"] {
                            let handlers: Vec<Arc<CountingHandler>> = types
                                .iter()
                                .map(|kind| CountingHandler::new(*kind, *kind != ResponseType::AgencyHandoff || turns % 2 == 0))
                                .collect();
                            let advisory = handlers[3].clone();
                            let router = ResponseRouter::new(
                                classifier(ScriptedCompletion::unreachable()),
                                ClarificationGate::new(ScriptedCompletion::replying(&[verdict]), settings()),
                                advisory,
                                handlers[..3].iter().map(|h| h.clone() as Arc<dyn ActionHandler>).collect(),
                                5,
                            );

                            let response = router
                                .dispatch(
                                    &request("show me the housing policy for renters", turns, selected),
                                    intent(response_type, needs_agency),
                                )
                                .await;

                            let total: usize = handlers.iter().map(|h| h.calls()).sum();
                            assert_eq!(total, 1, "{response_type:?} {needs_agency} {selected:?} {turns} {verdict}");
                            assert!(
                                !response.routing.should_clarify || response.routing.response_type == ResponseType::Advisory
                            );
                            assert_eq!(response.response, format!("{:?}", response.routing.response_type));
                        }
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn agency_handoff_on_a_help_opening_does_not_claim_clarification() {
        let handoff = CountingHandler::new(ResponseType::AgencyHandoff, true);
        let advisory = CountingHandler::new(ResponseType::Advisory, true);
        let router = ResponseRouter::new(
            classifier(ScriptedCompletion::unreachable()),
            ClarificationGate::new(ScriptedCompletion::unreachable(), settings()),
            advisory.clone(),
            vec![handoff.clone() as Arc<dyn ActionHandler>],
            5,
        );

        let response = router
            .dispatch(
                &request("please help, which agency handles my work permit", 0, None),
                intent(ResponseType::AgencyHandoff, true),
            )
            .await;

        assert_eq!(response.routing, RoutingDecision { response_type: ResponseType::AgencyHandoff, should_clarify: false });
        assert_eq!(handoff.calls(), 1);
        assert_eq!(advisory.calls(), 0);
    }

    #[tokio::test]
    async fn housing_policies_are_looked_up_and_narrated() {
        let completion = ScriptedCompletion::replying(&[
            r#"{"category": "housing", "needs_agency": false, "suggested_agencies": [], "response_type": "ragLink", "reasoning": "policies"}"#,
            "yes",
            "Decree 1 sets the housing subsidy; Decree 2 covers rentals; Decree 3 covers social housing.",
        ]);
        let retrieval = StaticRetrieval::with(vec![record("Decree 1", 0.91), record("Decree 2", 0.85), record("Decree 3", 0.8)]);
        let advisory = Arc::new(AdvisoryChatHandler::new(completion.clone(), settings(), settings()));
        let router = ResponseRouter::new(
            classifier(completion.clone()),
            ClarificationGate::new(completion.clone(), settings()),
            advisory.clone(),
            vec![Arc::new(RetrievalLookupHandler::documents(retrieval.clone(), advisory, 3))],
            5,
        );

        let response = router.route(&request("show me housing policies", 0, None)).await;

        assert_eq!(response.intent.response_type, ResponseType::DocumentLookup);
        assert_eq!(response.intent.category, Some(Category::Housing));
        assert!(!response.intent.needs_agency);
        assert_eq!(response.routing, RoutingDecision { response_type: ResponseType::DocumentLookup, should_clarify: false });
        assert_eq!(response.documents.len(), 3);
        assert!(response.response.starts_with("Decree 1"));
        assert_eq!(retrieval.calls(), 1);
        assert_eq!(completion.call_count(), 3);
    }

    #[tokio::test]
    async fn vague_opening_gets_a_clarifying_answer_without_retrieval() {
        let completion = ScriptedCompletion::replying(&["Of course. What is the problem about, and which city are you in?"]);
        let retrieval = StaticRetrieval::with(vec![record("Decree 1", 0.9)]);
        let advisory = Arc::new(AdvisoryChatHandler::new(completion.clone(), settings(), settings()));
        let router = ResponseRouter::new(
            classifier(completion.clone()),
            ClarificationGate::new(completion.clone(), settings()),
            advisory.clone(),
            vec![
                Arc::new(RetrievalLookupHandler::documents(retrieval.clone(), advisory.clone(), 3)),
                Arc::new(RetrievalLookupHandler::forms(retrieval.clone(), advisory, 3)),
            ],
            5,
        );

        let response = router.route(&request("I need help", 0, None)).await;

        assert_eq!(response.routing, RoutingDecision { response_type: ResponseType::Advisory, should_clarify: true });
        assert_eq!(response.follow_up_questions.len(), 1);
        assert_eq!(retrieval.calls(), 0);
        assert_eq!(completion.call_count(), 1);
        assert!(completion.prompts()[0].contains("too vague"));
    }

    #[tokio::test]
    async fn gate_rejection_turns_a_lookup_into_clarification() {
        let completion = ScriptedCompletion::replying(&["no", "Which province is the property in?"]);
        let retrieval = StaticRetrieval::with(vec![record("Decree 1", 0.9)]);
        let advisory = Arc::new(AdvisoryChatHandler::new(completion.clone(), settings(), settings()));
        let router = ResponseRouter::new(
            classifier(ScriptedCompletion::unreachable()),
            ClarificationGate::new(completion.clone(), settings()),
            advisory.clone(),
            vec![Arc::new(RetrievalLookupHandler::documents(retrieval.clone(), advisory, 3))],
            5,
        );

        let response = router
            .dispatch(&request("show me the land policy", 1, None), intent(ResponseType::DocumentLookup, false))
            .await;

        assert_eq!(response.routing.response_type, ResponseType::Advisory);
        assert!(response.routing.should_clarify);
        assert_eq!(retrieval.calls(), 0);
    }
}
