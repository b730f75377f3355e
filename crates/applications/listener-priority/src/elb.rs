//! ELBv2 rule store
//!
//! Reads listener rules through `DescribeRules` and normalizes them into core
//! [`Rule`]s. The store is read-only: it never creates or deletes rules.
//!
//! ## Pagination
//!
//! `DescribeRules` returns at most 400 rules per call and a `NextMarker` when
//! more remain. A snapshot is only handed to the solver after the last page,
//! since a partial listing would make occupied priorities look free.
//!
//! ## Prerequisites
//!
//! - IAM permission `elasticloadbalancing:DescribeRules` on the listener

use crate::config::AllocatorConfig;
use crate::error::{ListenerPriorityError, Result};
use async_trait::async_trait;
use aws_sdk_elasticloadbalancingv2::types::{Rule as ElbRule, RuleCondition as ElbRuleCondition};
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;
use aws_types::region::Region;
use futures::{Future, Stream, TryStreamExt};
use listener_priority_core::{AllocationError, Rule, RuleCondition, RulePriority, RuleStore, Snapshot};
use tracing::{debug, info};

/// Rule store backed by the ELBv2 API
#[derive(Debug, Clone)]
pub struct ElbRuleStore {
    client: ElbClient,
    page_size: Option<i32>,
}

impl ElbRuleStore {
    /// Create a rule store from an ELB client
    pub fn new(client: ElbClient) -> Self {
        Self {
            client,
            page_size: None,
        }
    }

    /// Create from AWS config
    pub fn from_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(ElbClient::new(config))
    }

    /// Set the DescribeRules page size
    pub fn with_page_size(mut self, page_size: Option<i32>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Fetch one DescribeRules page starting at `marker`
    async fn fetch_page(&self, listener_arn: &str, marker: Option<String>) -> Result<RulePage> {
        let response = self
            .client
            .describe_rules()
            .listener_arn(listener_arn)
            .set_marker(marker)
            .set_page_size(self.page_size)
            .send()
            .await
            .map_err(ListenerPriorityError::from_aws)?;

        let rules = response
            .rules()
            .iter()
            .map(convert_rule)
            .collect::<listener_priority_core::Result<Vec<_>>>()?;

        debug!(
            listener = %listener_arn,
            rules = rules.len(),
            more = response.next_marker().is_some(),
            "Fetched rule page"
        );

        Ok(RulePage {
            rules,
            next_marker: response.next_marker().map(str::to_string),
        })
    }
}

#[async_trait]
impl RuleStore for ElbRuleStore {
    async fn read(&self, listener_id: &str) -> listener_priority_core::Result<Snapshot> {
        let pages = paginate(move |marker| self.fetch_page(listener_id, marker));
        let rules = collect_rules(pages).await.map_err(AllocationError::from)?;

        debug!(
            listener = %listener_id,
            rules = rules.len(),
            "Read listener snapshot"
        );

        Ok(Snapshot::new(listener_id, rules))
    }
}

/// One page of a rule listing
#[derive(Debug, Clone, Default)]
struct RulePage {
    rules: Vec<Rule>,
    next_marker: Option<String>,
}

/// Stream every page, feeding each `NextMarker` into the next fetch
///
/// Stops after the first page without a marker; an empty marker counts as none.
fn paginate<F, Fut>(mut fetch_page: F) -> impl Stream<Item = Result<Vec<Rule>>> + Send
where
    F: FnMut(Option<String>) -> Fut + Send,
    Fut: Future<Output = Result<RulePage>> + Send,
{
    async_stream::try_stream! {
        let mut marker: Option<String> = None;

        loop {
            let page = fetch_page(marker.take()).await?;
            let next_marker = page.next_marker.filter(|m| !m.is_empty());

            yield page.rules;

            match next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
    }
}

/// Concatenate every page; the first failing page fails the whole listing
async fn collect_rules<St>(pages: St) -> Result<Vec<Rule>>
where
    St: Stream<Item = Result<Vec<Rule>>> + Send,
{
    let mut pages = Box::pin(pages);
    let mut rules = Vec::new();

    while let Some(page) = pages.try_next().await? {
        rules.extend(page);
    }

    Ok(rules)
}

/// Normalize one DescribeRules entry
///
/// A rule without a priority field is malformed: every rule, the default one
/// included, reports one.
fn convert_rule(rule: &ElbRule) -> listener_priority_core::Result<Rule> {
    let priority = rule.priority().map(RulePriority::parse).ok_or_else(|| {
        AllocationError::upstream(format!(
            "Rule {} has no priority",
            rule.rule_arn().unwrap_or("<unknown>")
        ))
    })?;

    let conditions = rule.conditions().iter().map(convert_condition).collect();

    Ok(Rule::new(priority, conditions))
}

/// Keep the legacy `Values` list, falling back to the host-header config
fn convert_condition(condition: &ElbRuleCondition) -> RuleCondition {
    let values = if !condition.values().is_empty() {
        condition.values().to_vec()
    } else {
        condition
            .host_header_config()
            .map(|config| config.values().to_vec())
            .unwrap_or_default()
    };

    RuleCondition::new(condition.field().map(str::to_string), values)
}

/// Load AWS config for `config.region`, or the default provider chain
pub async fn load_aws_config(config: &AllocatorConfig) -> aws_config::SdkConfig {
    match &config.region {
        Some(region) => {
            info!(region = %region, "Using configured AWS region");
            aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(Region::new(region.clone()))
                .load()
                .await
        }
        None => aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await,
    }
}

/// Create an ELB rule store from allocator config
pub async fn create_rule_store(config: &AllocatorConfig) -> ElbRuleStore {
    let sdk_config = load_aws_config(config).await;
    ElbRuleStore::from_config(&sdk_config).with_page_size(config.page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_elasticloadbalancingv2::types::HostHeaderConditionConfig;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Serves canned pages in order and records the marker of every fetch
    fn paged_listing(
        pages: Vec<Result<RulePage>>,
    ) -> (
        impl FnMut(Option<String>) -> std::future::Ready<Result<RulePage>> + Send,
        Arc<Mutex<Vec<Option<String>>>>,
    ) {
        let markers = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&markers);
        let mut pages = VecDeque::from(pages);

        let fetch = move |marker: Option<String>| {
            seen.lock().unwrap().push(marker);
            std::future::ready(pages.pop_front().unwrap_or_else(|| {
                Err(ListenerPriorityError::from_aws("fetched past the last page"))
            }))
        };

        (fetch, markers)
    }

    fn page(priorities: &[u32], next_marker: Option<&str>) -> Result<RulePage> {
        Ok(RulePage {
            rules: priorities
                .iter()
                .map(|p| Rule::for_host(*p, format!("svc-{}.example.com", p)))
                .collect(),
            next_marker: next_marker.map(str::to_string),
        })
    }

    #[test]
    fn test_convert_host_header_rule() {
        let rule = ElbRule::builder()
            .rule_arn("arn:aws:elasticloadbalancing:eu-west-1:123456789012:listener-rule/app/lb/1/2/3")
            .priority("7")
            .conditions(
                ElbRuleCondition::builder()
                    .field("host-header")
                    .values("svc.example.com")
                    .build(),
            )
            .build();

        let converted = convert_rule(&rule).unwrap();

        assert_eq!(converted.priority, RulePriority::Numeric(7));
        assert_eq!(converted.routing_hostname(), Some("svc.example.com"));
        assert_eq!(converted.conditions[0].field.as_deref(), Some("host-header"));
    }

    #[test]
    fn test_convert_default_rule() {
        let rule = ElbRule::builder().priority("default").is_default(true).build();

        let converted = convert_rule(&rule).unwrap();

        assert_eq!(converted.priority.as_number(), None);
        assert!(converted.conditions.is_empty());
    }

    #[test]
    fn test_convert_falls_back_to_host_header_config() {
        let rule = ElbRule::builder()
            .priority("12")
            .conditions(
                ElbRuleCondition::builder()
                    .field("host-header")
                    .host_header_config(
                        HostHeaderConditionConfig::builder()
                            .values("config.example.com")
                            .build(),
                    )
                    .build(),
            )
            .build();

        let converted = convert_rule(&rule).unwrap();

        assert_eq!(converted.routing_hostname(), Some("config.example.com"));
    }

    #[test]
    fn test_rule_without_priority_is_malformed() {
        let rule = ElbRule::builder().rule_arn("arn:rule/1").build();

        let err = convert_rule(&rule).unwrap_err();

        assert_eq!(err, AllocationError::upstream("Rule arn:rule/1 has no priority"));
    }

    #[tokio::test]
    async fn test_every_page_is_collected() {
        let (fetch, markers) = paged_listing(vec![
            page(&[1, 2], Some("m1")),
            page(&[3, 4], Some("m2")),
            page(&[7], None),
        ]);

        let rules = collect_rules(paginate(fetch)).await.unwrap();

        let priorities: Vec<_> = rules.iter().filter_map(|r| r.priority.as_number()).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 7]);
        assert_eq!(
            *markers.lock().unwrap(),
            vec![None, Some("m1".to_string()), Some("m2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_next_marker_ends_listing() {
        let (fetch, markers) = paged_listing(vec![
            page(&[1], Some("m1")),
            page(&[2], Some("")),
            page(&[3], None),
        ]);

        let rules = collect_rules(paginate(fetch)).await.unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(markers.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_page_fails_whole_listing() {
        let (fetch, markers) = paged_listing(vec![
            page(&[1, 2], Some("m1")),
            Err(ListenerPriorityError::from_aws("Throttling: rate exceeded")),
            page(&[3], None),
        ]);

        let err = collect_rules(paginate(fetch)).await.unwrap_err();

        assert_eq!(
            AllocationError::from(err),
            AllocationError::upstream("AWS service error: Throttling: rate exceeded")
        );
        assert_eq!(markers.lock().unwrap().len(), 2);
    }
}
