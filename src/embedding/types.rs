// Copyright 2025 Muvon Un Limited
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Shared embedding types: the query/passage distinction and the code-vs-prose
//! task auto-detection used to pick a query prefix (§4.6).

/// Which of the two prompting modes a batch is framed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
	Query,
	Passage,
}

/// Query sub-task, auto-detected from the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTask {
	Code2Code,
	Nl2Code,
}

/// Punctuation characteristic of code (vs. natural language) queries.
const CODE_PUNCTUATION: &[char] = &['(', ')', '{', '}', '[', ']', ';', '=', '<', '>', '&', '|'];

/// Detect whether a query reads as code (`code2code`) or natural language
/// (`nl2code`), based on the presence of characteristic code punctuation.
pub fn detect_query_task(query: &str) -> QueryTask {
	let code_like = query.contains("()")
		|| query.contains("::")
		|| query.contains("->")
		|| query.contains("=>")
		|| query.chars().filter(|c| CODE_PUNCTUATION.contains(c)).count() >= 2;

	if code_like {
		QueryTask::Code2Code
	} else {
		QueryTask::Nl2Code
	}
}

/// Prefix applied before handing text to the local model (§4.6): queries and
/// passages use different prefixes, and the two query sub-tasks differ too.
pub fn prefix_for(kind: EmbedKind, task: Option<QueryTask>) -> &'static str {
	match kind {
		EmbedKind::Passage => crate::constants::PASSAGE_PREFIX,
		EmbedKind::Query => match task.unwrap_or(QueryTask::Nl2Code) {
			QueryTask::Code2Code => crate::constants::QUERY_PREFIX_CODE2CODE,
			QueryTask::Nl2Code => crate::constants::QUERY_PREFIX_NL2CODE,
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_code_like_query() {
		assert_eq!(detect_query_task("fn main() { foo::bar() }"), QueryTask::Code2Code);
	}

	#[test]
	fn detects_natural_language_query() {
		assert_eq!(detect_query_task("how do I parse a config file"), QueryTask::Nl2Code);
	}
}
