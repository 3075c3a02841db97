//! Schema catalog models.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Target of a foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

/// A table with its columns and primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Primary-key columns in key order.
    pub primary_key: Vec<String>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Relationship cardinality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    #[default]
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToMany => "many_to_many",
        }
    }
}

/// A foreign key, read as `from_table.from_column -> to_table.to_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRelationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub cardinality: Cardinality,
}

impl TableRelationship {
    /// The column on `table`'s side of the relationship.
    pub fn column_on(&self, table: &str) -> Option<&str> {
        if self.from_table == table {
            Some(&self.from_column)
        } else if self.to_table == table {
            Some(&self.to_column)
        } else {
            None
        }
    }
}

/// One traversable direction of a relationship.
#[derive(Debug, Clone, Copy)]
struct Hop {
    neighbor: usize,
    relationship: usize,
}

/// Introspected schema plus its relationship graph.
///
/// The adjacency lists hold both directions of every foreign key, in the
/// order relationships were discovered, so traversal never special-cases
/// direction and ties between equal-length paths resolve the same way on
/// every run.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDefinition {
    pub tables: Vec<TableDefinition>,
    pub relationships: Vec<TableRelationship>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    adjacency: Vec<Vec<Hop>>,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl SchemaDefinition {
    pub fn new(tables: Vec<TableDefinition>, relationships: Vec<TableRelationship>) -> Self {
        let index: HashMap<String, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        let mut adjacency = vec![Vec::new(); tables.len()];
        for (rel_idx, rel) in relationships.iter().enumerate() {
            let (Some(&from), Some(&to)) = (index.get(&rel.from_table), index.get(&rel.to_table)) else {
                continue;
            };
            adjacency[from].push(Hop {
                neighbor: to,
                relationship: rel_idx,
            });
            if from != to {
                adjacency[to].push(Hop {
                    neighbor: from,
                    relationship: rel_idx,
                });
            }
        }

        Self {
            tables,
            relationships,
            index,
            adjacency,
            generation: 0,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Relationships touching a table, in discovery order.
    pub fn relationships_of<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a TableRelationship> {
        self.relationships
            .iter()
            .filter(move |r| r.from_table == table || r.to_table == table)
    }

    /// Shortest join path by hop count, breadth-first over both directions.
    ///
    /// `Some(vec![])` for a known table joined to itself, `None` when either
    /// table is unknown or the two are disconnected.
    pub fn join_path(&self, from: &str, to: &str) -> Option<Vec<TableRelationship>> {
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        if start == goal {
            return Some(Vec::new());
        }

        // parent[node] = (previous node, relationship used to arrive)
        let mut parent: HashMap<usize, (usize, usize)> = HashMap::new();
        let mut visited: HashSet<usize> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for hop in &self.adjacency[current] {
                if !visited.insert(hop.neighbor) {
                    continue;
                }
                parent.insert(hop.neighbor, (current, hop.relationship));
                if hop.neighbor == goal {
                    return Some(self.unwind(&parent, start, goal));
                }
                queue.push_back(hop.neighbor);
            }
        }

        None
    }

    fn unwind(&self, parent: &HashMap<usize, (usize, usize)>, start: usize, goal: usize) -> Vec<TableRelationship> {
        let mut path = Vec::new();
        let mut node = goal;
        while node != start {
            let (prev, rel) = parent[&node];
            path.push(self.relationships[rel].clone());
            node = prev;
        }
        path.reverse();
        path
    }
}
