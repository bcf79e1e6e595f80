mod merge_base_laws;
mod ref_compare_and_swap;
mod topo_sort_and_bisection;
