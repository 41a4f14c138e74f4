//! リソース間の依存グラフ
//!
//! 辺は参照 (`${aws_vpc.main.id}`) と明示的な `depends_on` から作られます。
//! グラフは独立したステップで構築し、プロバイダーを呼ぶ前に循環を検査します。

use crate::model::{Address, Document};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// グラフの構築・整列で発生するエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// 依存の循環。経路は同じノードで始まり同じノードに戻る
    #[error("依存関係が循環しています: {}", format_cycle(.0))]
    Cycle(Vec<Address>),

    /// 宣言されていないノードへの依存
    #[error("{from} が未定義のリソース {to} に依存しています")]
    UnresolvedReference { from: Address, to: Address },
}

fn format_cycle(cycle: &[Address]) -> String {
    let mut parts: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    if let Some(first) = cycle.first() {
        parts.push(first.to_string());
    }
    parts.join(" -> ")
}

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// 有向グラフ: ノード -> 依存先ノード
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: BTreeMap<Address, BTreeSet<Address>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// ドキュメントのすべての resource / data からグラフを構築
    pub fn from_document(document: &Document) -> GraphResult<Self> {
        let mut graph = Self::new();
        for address in document.resources.keys() {
            graph.add_node(address.clone());
        }
        for node in document.resources.values() {
            for dependency in node.dependencies() {
                if !graph.contains(&dependency) {
                    return Err(GraphError::UnresolvedReference {
                        from: node.address.clone(),
                        to: dependency,
                    });
                }
                graph.add_dependency(node.address.clone(), dependency);
            }
        }
        debug!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    pub fn add_node(&mut self, address: Address) {
        self.edges.entry(address).or_default();
    }

    /// `from` が `to` に依存する。無いノードは追加される
    pub fn add_dependency(&mut self, from: Address, to: Address) {
        self.add_node(to.clone());
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.edges.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Address> {
        self.edges.keys()
    }

    /// 直接の依存先
    pub fn dependencies(&self, address: &Address) -> impl Iterator<Item = &Address> {
        self.edges.get(address).into_iter().flatten()
    }

    /// 直接の依存元
    pub fn dependents<'a>(&'a self, address: &'a Address) -> impl Iterator<Item = &'a Address> {
        self.edges
            .iter()
            .filter(move |(_, deps)| deps.contains(address))
            .map(|(node, _)| node)
    }

    /// 作成順。各ノードは依存先すべての後に来る
    ///
    /// 循環があれば途中までの順序は返さず [`GraphError::Cycle`] を返す
    pub fn topological_sort(&self) -> GraphResult<Vec<Address>> {
        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(self.len());

        for node in self.edges.keys() {
            self.visit(node, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a Address,
        marks: &mut BTreeMap<&'a Address, Mark>,
        path: &mut Vec<&'a Address>,
        order: &mut Vec<Address>,
    ) -> GraphResult<()> {
        match marks.get(node) {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let cycle = path[start..].iter().map(|n| (*n).clone()).collect();
                return Err(GraphError::Cycle(cycle));
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        path.push(node);
        for dependency in self.dependencies(node) {
            self.visit(dependency, marks, path, order)?;
        }
        path.pop();
        marks.insert(node, Mark::Visited);
        order.push(node.clone());
        Ok(())
    }

    /// 削除順。[`Self::topological_sort`] のちょうど逆
    pub fn destroy_order(&self) -> GraphResult<Vec<Address>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// 依存先がすべて前の wave にあるノードの組 (wave)
    ///
    /// 同じ wave のノード同士は互いに独立している
    pub fn levels(&self) -> GraphResult<Vec<Vec<Address>>> {
        let order = self.topological_sort()?;
        let mut depth: BTreeMap<&Address, usize> = BTreeMap::new();
        let mut levels: Vec<Vec<Address>> = Vec::new();

        for node in &order {
            let level = self
                .dependencies(node)
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(node.clone());
        }
        Ok(levels)
    }

    /// Graphviz DOT 形式。辺はノードから依存先へ向かう
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph skyform {\n");
        output.push_str("    rankdir=RL;\n");
        output.push_str("    node [shape=box, style=rounded];\n\n");

        for node in self.edges.keys() {
            let shape = if node.is_data() { "ellipse" } else { "box" };
            output.push_str(&format!("    \"{}\" [shape={}];\n", node, shape));
        }
        output.push('\n');
        for (node, deps) in &self.edges {
            for dep in deps {
                output.push_str(&format!("    \"{}\" -> \"{}\";\n", node, dep));
            }
        }

        output.push_str("}\n");
        output
    }
}
