//! Research stage
//!
//! Walks the fixed category catalogue, queries the search capability once per
//! subtopic, and collects the hits into an [`EvidenceStore`]. Each finished
//! category is persisted as its own document.

use crate::artifacts::{ArtifactStore, PersistedArtifact};
use crate::capability::{call_with_retry, RetryPolicy, SearchCapability};
use crate::error::PipelineError;
use crate::models::{category_index, CategoryEvidence, ProgressDetail};
use crate::progress::ProgressSink;
use crate::stage::Stage;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One research topic and the narrower queries run for it.
#[derive(Debug, Clone, Copy)]
pub struct ResearchCategory {
    pub id: &'static str,
    pub subtopics: &'static [&'static str],
}

pub const CATEGORIES: &[ResearchCategory] = &[
    ResearchCategory {
        id: "1_business_fundamentals_and_model_stability",
        subtopics: &[
            "core business description and primary value proposition",
            "segment-wise revenue and profit breakdown (product, geography, customer type)",
            "revenue concentration, top customers above 10% share, stability of key contracts",
            "business model repeatability, recurring vs transactional revenue proportion",
            "competitive landscape, primary competitors, differentiation factors",
            "industry structure and cyclicality (barriers to entry, supplier/customer power)",
        ],
    },
    ResearchCategory {
        id: "2_financial_strength_and_quality_of_earnings",
        subtopics: &[
            "5-year trend in revenue, EBITDA, operating profit, PAT",
            "cash flow consistency, CFO vs PAT comparison, FCF sustainability",
            "ROE, ROCE, ROA trend and consistency vs industry averages",
            "margin stability, gross, operating and net margins over 5 years",
            "quality of earnings, one-offs, restatements, extraordinary items",
            "working capital cycle efficiency, receivable days, inventory, payables trend",
        ],
    },
    ResearchCategory {
        id: "3_balance_sheet_health_and_liquidity",
        subtopics: &[
            "debt-to-equity ratio, interest coverage ratio, leverage trend",
            "cash and liquid assets vs short-term obligations",
            "capital expenditure trend, maintenance vs growth capex",
            "contingent liabilities, off-balance sheet exposures, guarantees",
            "credit ratings, debt maturity profile",
        ],
    },
    ResearchCategory {
        id: "4_intrinsic_value_and_market_positioning",
        subtopics: &[
            "current market price, market cap, enterprise value",
            "analyst target price range, consensus valuation estimates",
            "institutional holding trend, top holders, changes over last 4 quarters",
            "DCF or comparable-based fair value estimation (P/E, EV/EBITDA, P/B)",
            "valuation premium or discount vs historical and sector averages",
        ],
    },
    ResearchCategory {
        id: "5_economic_moat_and_durability",
        subtopics: &[
            "sources of moat, brand equity, IP, patents, regulatory licenses, switching costs",
            "evidence of pricing power, gross margin resilience, market share stability",
            "distribution advantages, customer loyalty indicators, renewal rates",
            "network effects, ecosystem lock-ins, data advantage",
            "moat sustainability, evidence of erosion or strengthening",
        ],
    },
    ResearchCategory {
        id: "6_management_integrity_and_capital_allocation",
        subtopics: &[
            "key management track record, tenure, competence",
            "insider ownership and recent insider trading (buy/sell trends)",
            "capital allocation track record, acquisitions, buybacks, dividends, debt repayment",
            "governance indicators, board independence, audit quality, disclosures",
            "transparency, investor communication, accounting conservatism",
        ],
    },
    ResearchCategory {
        id: "7_growth_drivers_and_future_visibility",
        subtopics: &[
            "strategic initiatives, expansion plans, R&D, product pipeline, partnerships",
            "industry growth projections and tailwinds",
            "growth guidance vs historical delivery rate",
            "long-term scalability and reinvestment opportunities",
            "technological disruption risk, readiness for innovation",
        ],
    },
    ResearchCategory {
        id: "8_macro_and_regional_sensitivity",
        subtopics: &[
            "dependence on domestic vs export markets, FX sensitivity",
            "regulatory dependencies, policy changes, taxation impact",
            "economic cyclicality exposure (interest rate, commodity price linkages)",
            "country risk, trade barriers, geopolitical exposure",
        ],
    },
    ResearchCategory {
        id: "9_behavioral_and_market_sentiment",
        subtopics: &[
            "12-month major news, litigation, fraud, leadership change, contracts won or lost",
            "analyst rating distribution and changes",
            "short interest, retail sentiment",
            "FII/DII flow trends and volatility of institutional confidence",
        ],
    },
    ResearchCategory {
        id: "10_risks_and_downside_scenarios",
        subtopics: &[
            "structural industry risks, technology obsolescence, policy threats",
            "execution risks, management capability, delays in capex or product rollout",
            "financial risks, leverage, liquidity crunch, credit events",
            "governance or compliance risks, audit issues, insider conflicts",
            "fraud or malpractice indicators, investigations, whistleblower complaints",
        ],
    },
    ResearchCategory {
        id: "11_integrity_and_governance_health",
        subtopics: &[
            "related-party transactions, promoter pledging trends",
            "corporate governance ratings, regulatory penalties or SEBI actions",
            "litigation record and material legal exposures",
            "ESG disclosures, environmental or social controversies",
        ],
    },
    ResearchCategory {
        id: "12_overall_fundamental_conviction_score",
        subtopics: &[
            "stability across cycles, earnings resilience in past downturns",
            "cash flow predictability and margin durability",
            "management credibility and governance trust level",
            "valuation comfort vs fundamentals",
            "net upside-to-risk trade-off",
        ],
    },
];

/// Raw evidence for one subject, categories kept in index order.
#[derive(Debug, Clone, Default)]
pub struct EvidenceStore {
    categories: Vec<CategoryEvidence>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an existing category with the same identifier.
    pub fn insert(&mut self, evidence: CategoryEvidence) {
        self.categories.retain(|c| c.category != evidence.category);
        self.categories.push(evidence);
        self.categories.sort_by_key(|c| category_index(&c.category));
    }

    pub fn categories(&self) -> &[CategoryEvidence] {
        &self.categories
    }

    pub fn get(&self, category: &str) -> Option<&CategoryEvidence> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.categories.iter().map(|c| c.item_count()).sum()
    }

    /// Size of the store as serialized JSON.
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(serde_json::to_vec(&self.categories)?.len())
    }
}

pub struct ResearchOutput {
    pub store: EvidenceStore,
    pub documents: Vec<PersistedArtifact>,
}

pub struct ResearchAgent {
    search: Arc<dyn SearchCapability>,
    artifacts: Arc<ArtifactStore>,
    retry: RetryPolicy,
    max_results_per_subtopic: usize,
    categories: &'static [ResearchCategory],
}

impl ResearchAgent {
    pub fn new(
        search: Arc<dyn SearchCapability>,
        artifacts: Arc<ArtifactStore>,
        retry: RetryPolicy,
        max_results_per_subtopic: usize,
    ) -> Self {
        Self {
            search,
            artifacts,
            retry,
            max_results_per_subtopic,
            categories: CATEGORIES,
        }
    }

    pub fn with_categories(mut self, categories: &'static [ResearchCategory]) -> Self {
        self.categories = categories;
        self
    }

    pub async fn run(
        &self,
        job_id: Uuid,
        subject: &str,
        progress: &dyn ProgressSink,
    ) -> Result<ResearchOutput> {
        let total_categories = self.categories.len();
        let mut store = EvidenceStore::new();
        let mut documents = Vec::with_capacity(total_categories);

        info!(subject, total_categories, "Starting research");

        for (cat_idx, category) in self.categories.iter().enumerate() {
            let mut evidence = CategoryEvidence::new(category.id);
            let total_subtopics = category.subtopics.len();

            for (sub_idx, subtopic) in category.subtopics.iter().enumerate() {
                progress
                    .report(ProgressDetail {
                        category: Some(category.id.to_string()),
                        category_number: Some(cat_idx + 1),
                        total_categories: Some(total_categories),
                        subtopic: Some(subtopic.to_string()),
                        subtopic_number: Some(sub_idx + 1),
                        total_subtopics: Some(total_subtopics),
                        message: format!("Searching: {}", subtopic),
                    })
                    .await;

                let query = format!("{} {}", subject, subtopic);
                let search = &self.search;
                let query_ref = query.as_str();
                let max_results = self.max_results_per_subtopic;

                let hits = call_with_retry(&self.retry, "search", move || {
                    search.search(query_ref, max_results)
                })
                .await
                .map_err(|e| {
                    PipelineError::stage_failed(
                        Stage::Researching,
                        format!("search failed for '{}': {}", query_ref, e),
                    )
                })?;

                debug!(category = category.id, subtopic, hits = hits.len(), "Subtopic searched");
                evidence.push_subtopic(*subtopic, query.clone(), hits, max_results);
            }

            let document = self
                .artifacts
                .save_category_evidence(job_id, subject, &evidence)
                .await?;
            documents.push(document);
            info!(
                category = category.id,
                items = evidence.item_count(),
                "Category research complete"
            );
            store.insert(evidence);
        }

        if store.total_items() == 0 {
            return Err(PipelineError::stage_failed(
                Stage::Researching,
                "No research data found",
            ));
        }

        Ok(ResearchOutput { store, documents })
    }
}
