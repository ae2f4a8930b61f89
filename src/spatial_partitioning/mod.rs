pub mod aabb_tree;
