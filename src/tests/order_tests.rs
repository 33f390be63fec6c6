#[cfg(test)]
mod tests {
    use crate::graph::{Edge, Graph};
    use crate::order::{
        BestPlanSelection, BuildPlan, OrderingAlgorithm, PlanOptions, best_weighted_dynamic_plan,
        degree_plan, dynamic_plan, naive_plan, weighted_dynamic_plan,
    };
    use crate::test_helpers::{
        assert_edges_follow_endpoints, assert_plan_invariants, clustered_graph, path_graph,
        random_graph,
    };
    use crate::topogen;

    fn all_plans(graph: &Graph) -> Vec<(OrderingAlgorithm, BuildPlan)> {
        <OrderingAlgorithm as clap::ValueEnum>::value_variants()
            .iter()
            .map(|&algo| (algo, algo.plan(graph, &PlanOptions::default())))
            .collect()
    }

    #[test]
    fn test_every_algorithm_keeps_plan_invariants() {
        let mut graphs = vec![path_graph(), clustered_graph(), topogen::star(7).unwrap()];
        for seed in 0..8 {
            graphs.push(random_graph(seed, 25, 0.15));
        }
        for graph in &graphs {
            for (algo, plan) in all_plans(graph) {
                assert_plan_invariants(graph, &plan);
                if algo != OrderingAlgorithm::Naive {
                    assert_edges_follow_endpoints(&plan);
                }
            }
        }
    }

    #[test]
    fn test_empty_graph_yields_empty_plan() {
        let graph = Graph::new();
        for (_, plan) in all_plans(&graph) {
            assert!(plan.is_empty());
            assert_eq!(plan.total_edges(), 0);
        }
    }

    #[test]
    fn test_naive_on_path_graph() {
        let plan = naive_plan(&path_graph());
        assert_eq!(plan.node_order, vec![0, 1, 2]);
        assert!(plan.edge_order[0].is_empty());
        assert!(plan.edge_order[1].is_empty());
        assert_eq!(
            plan.edge_order[2],
            vec![Edge::internal(0, 1), Edge::internal(1, 2)]
        );
        assert_eq!(plan.cumulative_edges, vec![0, 0, 2]);
    }

    #[test]
    fn test_naive_puts_dangling_edges_last() {
        let graph = clustered_graph();
        let plan = naive_plan(&graph);
        let last = plan.edge_order.last().unwrap();
        assert_eq!(last.len(), graph.edge_count());
        assert!(plan.edge_order[..plan.len() - 1].iter().all(Vec::is_empty));
        let externals = last.iter().filter(|e| !e.is_internal()).count();
        assert_eq!(externals, 3);
        assert!(last[..last.len() - externals].iter().all(Edge::is_internal));
    }

    #[test]
    fn test_degree_on_path_graph() {
        let plan = degree_plan(&path_graph());
        // node 1 has the highest degree; 0 and 2 then tie and 0 wins
        assert_eq!(plan.node_order, vec![1, 0, 2]);
        assert!(plan.edge_order[0].is_empty());
        assert_eq!(plan.edge_order[1], vec![Edge::internal(0, 1)]);
        assert_eq!(plan.edge_order[2], vec![Edge::internal(2, 1)]);
        assert_eq!(plan.cumulative_edges, vec![0, 1, 2]);
    }

    #[test]
    fn test_dynamic_on_path_graph() {
        let plan = dynamic_plan(&path_graph());
        // all scores start at zero; each placement pulls its neighbor forward
        assert_eq!(plan.node_order, vec![0, 1, 2]);
        assert_eq!(plan.edge_order[1], vec![Edge::internal(1, 0)]);
        assert_eq!(plan.edge_order[2], vec![Edge::internal(2, 1)]);
        assert_eq!(plan.cumulative_edges, vec![0, 1, 2]);
    }

    #[test]
    fn test_dynamic_prefers_dangling_endpoints_first() {
        let plan = dynamic_plan(&clustered_graph());
        // node 6 carries two dangling edges, node 1 one
        assert_eq!(plan.node_order[0], 6);
        assert_eq!(plan.cumulative_edges[0], 2);
    }

    #[test]
    fn test_weighted_dynamic_completes_clusters() {
        let plan = weighted_dynamic_plan(&clustered_graph(), Some(1));
        assert_eq!(plan.node_order, vec![1, 3, 2, 4, 6, 5]);
        assert_eq!(plan.cumulative_edges, vec![1, 2, 4, 5, 8, 10]);
    }

    #[test]
    fn test_weighted_dynamic_without_start_takes_highest_degree() {
        let plan = weighted_dynamic_plan(&clustered_graph(), None);
        assert_eq!(plan.node_order[0], 6);
    }

    #[test]
    fn test_weighted_dynamic_forced_start() {
        let graph = random_graph(3, 20, 0.2);
        for start in graph.nodes() {
            let plan = weighted_dynamic_plan(&graph, Some(start));
            assert_eq!(plan.node_order[0], start);
            assert_plan_invariants(&graph, &plan);
        }
    }

    #[test]
    fn test_best_weighted_dynamic_selection() {
        let graph = random_graph(9, 18, 0.2);
        let candidates: Vec<BuildPlan> = graph
            .nodes()
            .into_iter()
            .map(|start| weighted_dynamic_plan(&graph, Some(start)))
            .collect();

        let best_score = candidates.iter().map(BuildPlan::accumulated_depth).min().unwrap();
        let first_best = candidates
            .iter()
            .find(|p| p.accumulated_depth() == best_score)
            .unwrap();
        assert_eq!(
            &best_weighted_dynamic_plan(&graph, BestPlanSelection::Best),
            first_best
        );
        assert_eq!(
            &best_weighted_dynamic_plan(&graph, BestPlanSelection::Last),
            candidates.last().unwrap()
        );
    }

    #[test]
    fn test_no_ordering_is_deeper_than_naive() {
        let graph = random_graph(21, 30, 0.1);
        let naive = naive_plan(&graph).accumulated_depth();
        for (_, plan) in all_plans(&graph) {
            assert!(plan.accumulated_depth() <= naive);
        }
    }

    #[test]
    fn test_dispatch_matches_direct_calls() {
        let graph = clustered_graph();
        let opts = PlanOptions {
            best_selection: BestPlanSelection::Last,
            start: Some(4),
        };
        assert_eq!(OrderingAlgorithm::Naive.plan(&graph, &opts), naive_plan(&graph));
        assert_eq!(OrderingAlgorithm::Degree.plan(&graph, &opts), degree_plan(&graph));
        assert_eq!(OrderingAlgorithm::Dynamic.plan(&graph, &opts), dynamic_plan(&graph));
        assert_eq!(
            OrderingAlgorithm::WeightedDynamic.plan(&graph, &opts),
            weighted_dynamic_plan(&graph, Some(4))
        );
        assert_eq!(
            OrderingAlgorithm::BestWeightedDynamic.plan(&graph, &opts),
            best_weighted_dynamic_plan(&graph, BestPlanSelection::Last)
        );
    }

    #[test]
    fn test_reversed_plan_keeps_invariants() {
        let graph = clustered_graph();
        let plan = degree_plan(&graph);
        let reversed = plan.reversed();
        assert_plan_invariants(&graph, &reversed);
        let mut order = plan.node_order.clone();
        order.reverse();
        assert_eq!(reversed.node_order, order);
    }

    #[test]
    fn test_parallel_edges_are_realised_separately() {
        let mut graph = path_graph();
        graph.add_edge(1, 0).unwrap();
        for (_, plan) in all_plans(&graph) {
            assert_plan_invariants(&graph, &plan);
            assert_eq!(plan.total_edges(), 3);
        }
    }
}
