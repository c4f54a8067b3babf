//! SV-COMP violation witness generation
//!
//! Builds a GraphML violation witness from the decoded trace. The graph is
//! a single path from the entry node to the violation node; branch events
//! additionally fork a sink edge carrying the opposite condition so a
//! witness checker cannot wander off the recorded path.

use crate::event::TraceEvent;
use sha2::{Digest, Sha256};

/// Accumulates witness chunks while the decoded trace is replayed.
pub struct WitnessBuilder {
    chunks: String,
    /// Node id of the last emitted state, without the `S` prefix.
    last: String,
}

impl Default for WitnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WitnessBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunks: String::new(),
            last: "1".to_string(),
        }
    }

    /// Record one decoded event. Events with no witness counterpart
    /// (context switches, mutex and condition traffic, messages) are
    /// silently skipped.
    pub fn record(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::ThreadCreated {
                state,
                coord,
                creator,
                created,
                created_name,
            } => {
                self.chunk(
                    state,
                    &self.last.clone(),
                    &format!("S{state}"),
                    &creator.to_string(),
                    &coord.line,
                    "createThread",
                    &created.to_string(),
                );
                self.last = state.clone();
                let entered = format!("{state}-2");
                self.chunk(
                    &entered,
                    &self.last.clone(),
                    &format!("S{entered}"),
                    &created.to_string(),
                    &coord.line,
                    "enterFunction",
                    created_name,
                );
                self.last = entered;
            }

            TraceEvent::ThreadExited {
                state,
                line,
                thread,
                function,
            } => {
                self.chunk(
                    state,
                    &self.last.clone(),
                    &format!("S{state}"),
                    &thread.to_string(),
                    &line.to_string(),
                    "returnFrom",
                    function,
                );
                self.last = state.clone();
            }

            TraceEvent::Branch {
                state,
                coord,
                thread,
                taken,
                loop_head,
            } => {
                let (chosen, rejected) = if *taken {
                    ("condition-true", "condition-false")
                } else {
                    ("condition-false", "condition-true")
                };
                let thread = thread.to_string();
                if *loop_head {
                    // Loop decisions pass through an explicit loop-head node.
                    let head = format!("{state}-0");
                    self.chunk(
                        &head,
                        &self.last.clone(),
                        &format!("S{head}"),
                        &thread,
                        &coord.line,
                        "enterLoopHead",
                        "true",
                    );
                    self.chunk(
                        state,
                        &head,
                        &format!("S{state}"),
                        &thread,
                        &coord.line,
                        "control",
                        chosen,
                    );
                    self.chunk(
                        &format!("{state}-2"),
                        &head,
                        "SINK",
                        &thread,
                        &coord.line,
                        "control",
                        rejected,
                    );
                } else {
                    self.chunk(
                        state,
                        &self.last.clone(),
                        &format!("S{state}"),
                        &thread,
                        &coord.line,
                        "control",
                        chosen,
                    );
                    self.chunk(
                        &format!("{state}-2"),
                        &self.last.clone(),
                        "SINK",
                        &thread,
                        &coord.line,
                        "control",
                        rejected,
                    );
                }
                self.last = state.clone();
            }

            TraceEvent::Assignment {
                state,
                coord,
                thread,
                lhs,
                rhs,
                scope,
                ..
            } => {
                // Referencing in the assumed value is not accepted by
                // witness checkers.
                if rhs.contains('&') || rhs.contains('{') {
                    return;
                }
                let assumption = format!("{lhs}=={rhs};");
                let scope_pair = scope
                    .as_ref()
                    .map(|s| ("assumption.scope", s.as_str()));
                self.chunk_with(
                    state,
                    &self.last.clone(),
                    &format!("S{state}"),
                    &thread.to_string(),
                    &coord.line,
                    "assumption",
                    &assumption,
                    scope_pair,
                );
                self.last = state.clone();
            }

            TraceEvent::ContextSwitch { .. }
            | TraceEvent::CondSignal { .. }
            | TraceEvent::CondWait { .. }
            | TraceEvent::MutexLock { .. }
            | TraceEvent::MutexUnlock { .. }
            | TraceEvent::MutexDestroy { .. }
            | TraceEvent::Message { .. } => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn chunk(
        &mut self,
        node: &str,
        source: &str,
        target: &str,
        thread: &str,
        line: &str,
        key: &str,
        value: &str,
    ) {
        self.chunk_with(node, source, target, thread, line, key, value, None);
    }

    #[allow(clippy::too_many_arguments)]
    fn chunk_with(
        &mut self,
        node: &str,
        source: &str,
        target: &str,
        thread: &str,
        line: &str,
        key: &str,
        value: &str,
        extra: Option<(&str, &str)>,
    ) {
        self.chunks.push_str(&format!(
            "<node id=\"S{node}\"/>\n\
             <edge source=\"S{source}\" target=\"{target}\">\n\
             <data key=\"threadId\">{thread}</data>\n\
             <data key=\"startline\">{line}</data>\n\
             <data key=\"endline\">{line}</data>\n"
        ));
        match extra {
            Some((extra_key, extra_value)) => self.chunks.push_str(&format!(
                "<data key=\"{key}\">{value}</data>\n\
                 <data key=\"{extra_key}\">{extra_value}</data></edge>\n\n"
            )),
            None => self
                .chunks
                .push_str(&format!("<data key=\"{key}\">{value}</data></edge>\n\n")),
        }
    }

    /// Assemble the complete witness document.
    ///
    /// `creation_time` is caller-supplied so a run can be reproduced; use
    /// [`now_timestamp`] for the wall clock.
    #[must_use]
    pub fn build(
        &self,
        program_file: &str,
        program_hash: &str,
        creation_time: &str,
        main_line: u32,
    ) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
             <graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n\
             \n\
             <key attr.name=\"programFile\" attr.type=\"string\" for=\"graph\" id=\"programfile\"/>\n\
             <key attr.name=\"programHash\" attr.type=\"string\" for=\"graph\" id=\"programhash\"/>\n\
             <key attr.name=\"specification\" attr.type=\"string\" for=\"graph\" id=\"specification\"/>\n\
             <key attr.name=\"architecture\" attr.type=\"string\" for=\"graph\" id=\"architecture\"/>\n\
             <key attr.name=\"producer\" attr.type=\"string\" for=\"graph\" id=\"producer\"/>\n\
             <key attr.name=\"creationTime\" attr.type=\"string\" for=\"graph\" id=\"creationtime\"/>\n\
             <key attr.name=\"witness-type\" attr.type=\"string\" for=\"graph\" id=\"witness-type\"/>\n\
             \n\
             <key attr.name=\"isViolationNode\" attr.type=\"boolean\" for=\"node\" id=\"violation\"><default>false</default></key>\n\
             <key attr.name=\"isEntryNode\" attr.type=\"boolean\" for=\"node\" id=\"entry\"><default>false</default></key>\n\
             <key attr.name=\"isSinkNode\" attr.type=\"boolean\" for=\"node\" id=\"sink\"><default>false</default></key>\n\
             <key attr.name=\"violatedProperty\" attr.type=\"string\" for=\"node\" id=\"violatedProperty\"/>\n\
             \n\
             <key attr.name=\"threadId\" attr.type=\"string\" for=\"edge\" id=\"threadId\"/>\n\
             <key attr.name=\"createThread\" attr.type=\"string\" for=\"edge\" id=\"createThread\"/>\n\
             <key attr.name=\"sourcecodeLanguage\" attr.type=\"string\" for=\"graph\" id=\"sourcecodelang\"/>\n\
             <key attr.name=\"startline\" attr.type=\"int\" for=\"edge\" id=\"startline\"/>\n\
             <key attr.name=\"endline\" attr.type=\"int\" for=\"edge\" id=\"endline\"/>\n\
             <key attr.name=\"control\" attr.type=\"string\" for=\"edge\" id=\"control\"/>\n\
             <key attr.name=\"enterFunction\" attr.type=\"string\" for=\"edge\" id=\"enterFunction\"/>\n\
             <key attr.name=\"returnFromFunction\" attr.type=\"string\" for=\"edge\" id=\"returnFrom\"/>\n\
             <key attr.name=\"enterLoopHead\" attr.type=\"boolean\" for=\"edge\" id=\"enterLoopHead\"><default>false</default></key>\n\
             <key attr.name=\"assumption\" attr.type=\"string\" for=\"edge\" id=\"assumption\"/>\n\
             <key attr.name=\"assumptionScope\" attr.type=\"string\" for=\"edge\" id=\"assumption.scope\"/>\n\
             \n\
             <graph edgedefault=\"directed\">\n\
             <data key=\"witness-type\">violation_witness</data>\n\
             <data key=\"sourcecodelang\">C</data>\n\
             <data key=\"producer\">lazyseq</data>\n\
             <data key=\"specification\">CHECK( init(main()), LTL(G ! call(reach_error())) )</data>\n\
             <data key=\"programfile\">{program_file}</data>\n\
             <data key=\"programhash\">{program_hash}</data>\n\
             <data key=\"creationtime\">{creation_time}</data>\n\
             <data key=\"architecture\">32bit</data>\n\
             \n\
             <node id=\"START\"><data key=\"entry\">true</data></node>\n\
             <node id=\"SINK\"><data key=\"sink\">true</data></node>\n\
             \n\
             <node id=\"S1\"/>\n\
             <edge source=\"START\" target=\"S1\">\n\
             <data key=\"threadId\">0</data>\n\
             <data key=\"startline\">{main_line}</data>\n\
             <data key=\"endline\">{main_line}</data>\n\
             <data key=\"createThread\">0</data>\n\
             <data key=\"enterFunction\">main</data>\n\
             </edge>\n\
             \n\
             {chunks}\
             <edge source=\"S{last}\" target=\"STOP\"/>\n\
             <node id=\"STOP\"><data key=\"violation\">true</data></node>\n\
             </graph>\n\
             </graphml>\n",
            chunks = self.chunks,
            last = self.last,
        )
    }
}

/// SHA-256 digest of a program file, lowercase hex.
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Current wall-clock time in the witness timestamp format.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
